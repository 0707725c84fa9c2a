//! Diagnostics sink — explicit, injected, never a module-level global.
//!
//! RULE: Components never log directly. Each component is handed a
//! `DiagnosticsSink` at construction and reports through it. The
//! integrator decides the sink's lifecycle (per episode or per process)
//! and its backend.

use crate::types::{PatientId, Timestamp};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Everything the controller subsystem reports about its own decisions.
/// Variants are added per component — never removed or reordered.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagEvent {
    /// An unknown patient identifier resolved to the population-average
    /// profile. This is a defined degradation path, not an error, but it
    /// can mask configuration mistakes — hence the signal.
    ProfileFallback { patient_id: PatientId },

    /// A meal bolus was computed by the rule-based policy.
    MealBolus {
        patient_id: PatientId,
        glucose: f64,
        meal_rate: f64,
        bolus_units: f64,
    },

    /// Raw PID control signal before any mode handling.
    ControlSignal { glucose: f64, control: f64 },

    /// The predictive policy finished its warm-up for a patient.
    WarmupCompleted { patient_id: PatientId, samples: usize },

    /// The predictive policy accepted an oracle recommendation.
    OracleDecision {
        patient_id: PatientId,
        mode: &'static str,
        basal_per_hr: f64,
        bolus_units: f64,
    },

    /// An episode was (re)composed from a root seed.
    EpisodeComposed {
        patient_id: PatientId,
        start_time: Timestamp,
    },
}

pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, event: &DiagEvent);
}

/// Forwards diagnostics to the `log` crate. The default backend for
/// binaries that initialize env_logger.
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn record(&self, event: &DiagEvent) {
        match event {
            DiagEvent::ProfileFallback { patient_id } => {
                log::warn!("therapy: unknown patient '{patient_id}', using population-average profile");
            }
            DiagEvent::MealBolus { patient_id, glucose, meal_rate, bolus_units } => {
                log::info!(
                    "bolus: patient={patient_id} glucose={glucose:.1} meal={meal_rate:.2} g/min bolus={bolus_units:.2} U"
                );
            }
            DiagEvent::ControlSignal { glucose, control } => {
                log::debug!("pid: glucose={glucose:.1} control={control:.6}");
            }
            DiagEvent::WarmupCompleted { patient_id, samples } => {
                log::info!("loop: patient={patient_id} warm-up complete after {samples} samples");
            }
            DiagEvent::OracleDecision { patient_id, mode, basal_per_hr, bolus_units } => {
                log::debug!(
                    "loop: patient={patient_id} mode={mode} basal={basal_per_hr:.3} U/hr bolus={bolus_units:.3} U"
                );
            }
            DiagEvent::EpisodeComposed { patient_id, start_time } => {
                log::info!("episode: patient={patient_id} start={start_time}");
            }
        }
    }
}

/// Discards everything. For callers that want no diagnostics at all.
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn record(&self, _event: &DiagEvent) {}
}

/// Captures events in memory so tests can assert on the signal path.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagEvent> {
        self.events.lock().expect("sink poisoned").clone()
    }

    /// Count of recorded fallback resolutions.
    pub fn fallback_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, DiagEvent::ProfileFallback { .. }))
            .count()
    }
}

impl DiagnosticsSink for MemorySink {
    fn record(&self, event: &DiagEvent) {
        self.events.lock().expect("sink poisoned").push(event.clone());
    }
}

/// Shared sink handle, the form every component constructor takes.
pub type SharedSink = Arc<dyn DiagnosticsSink>;

pub fn log_sink() -> SharedSink {
    Arc::new(LogSink)
}

pub fn null_sink() -> SharedSink {
    Arc::new(NullSink)
}
