//! Predictive "Loop" policy.
//!
//! A per-patient two-state machine over the observation window:
//! WARMUP until three hours of history exist, then ACTIVE, where every
//! decision comes from the external dose-recommendation oracle. The
//! transition is one-way for a patient-episode; only reset() re-enters
//! warm-up by dropping the window.
//!
//! An active meal announcement always forces a manual-bolus request and
//! fully suppresses basal for that step. Oracle failures are fatal for
//! the step and propagate — fallback policy is the caller's decision.

use crate::{
    diag::{DiagEvent, SharedSink},
    error::{SimError, SimResult},
    observation::{ObservationRecord, ObservationWindow},
    oracle::{DoseOracle, DoseRequest, DoseResponse, RecommendationMode, DEFAULT_INSULIN_TYPE},
    policy::{DosingPolicy, PolicyContext},
    therapy::TherapyLookup,
    types::{dose_to_rate, per_hour_to_per_min, per_min_to_per_hour, Action},
};

/// History required before the oracle is consulted.
pub const WARMUP_MINUTES: f64 = 180.0;

/// Bound on the trailing slice sent to the oracle.
pub const WINDOW_HOURS: f64 = 12.0;

/// Automatic recommendations may raise basal to at most this multiple
/// of the scheduled rate.
const MAX_BASAL_MULTIPLIER: f64 = 2.0;

pub struct LoopPolicy {
    lookup: TherapyLookup,
    window: ObservationWindow,
    oracle: Box<dyn DoseOracle>,
    /// Mode used when no meal is announced: TempBasal or AutomaticBolus.
    automatic_mode: RecommendationMode,
    insulin_type: String,
    sink: SharedSink,
}

impl LoopPolicy {
    pub fn new(lookup: TherapyLookup, oracle: Box<dyn DoseOracle>, sink: SharedSink) -> Self {
        Self {
            lookup,
            window: ObservationWindow::new(),
            oracle,
            automatic_mode: RecommendationMode::TempBasal,
            insulin_type: DEFAULT_INSULIN_TYPE.to_string(),
            sink,
        }
    }

    pub fn with_mode(mut self, mode: RecommendationMode) -> Self {
        assert!(
            mode != RecommendationMode::ManualBolus,
            "manual bolus is the meal path, not an automatic mode"
        );
        self.automatic_mode = mode;
        self
    }

    pub fn with_insulin_type(mut self, insulin_type: &str) -> Self {
        self.insulin_type = insulin_type.to_string();
        self
    }

    /// Read access to the logged history (audit, tests).
    pub fn window(&self) -> &ObservationWindow {
        &self.window
    }

    /// Samples required before a patient leaves warm-up.
    pub fn warmup_samples(sample_time: f64) -> usize {
        (WARMUP_MINUTES / sample_time) as usize
    }

    fn request_for(
        &self,
        ctx: &PolicyContext,
        scheduled_per_hr: f64,
        mode: RecommendationMode,
        max_basal_per_hr: Option<f64>,
    ) -> DoseRequest {
        let resolved = self.lookup.resolve(ctx.patient_id);
        let tail_len = (WINDOW_HOURS * 60.0 / ctx.sample_time) as usize;
        DoseRequest {
            series: self.window.tail(ctx.patient_id, tail_len).to_vec(),
            scheduled_basal_per_hr: scheduled_per_hr,
            correction_factor: resolved.profile.correction_factor,
            carb_ratio: resolved.profile.carb_ratio,
            insulin_type: self.insulin_type.clone(),
            prediction_start: ctx.now,
            mode,
            max_basal_per_hr,
        }
    }
}

impl DosingPolicy for LoopPolicy {
    fn name(&self) -> &'static str {
        match self.automatic_mode {
            RecommendationMode::AutomaticBolus => "loop-automatic-bolus",
            _ => "loop-temp-basal",
        }
    }

    fn decide(&mut self, ctx: &PolicyContext) -> SimResult<Action> {
        ctx.check_sample_time()?;

        let scheduled = self.lookup.resolve(ctx.patient_id).profile.scheduled_basal();
        let scheduled_per_hr = per_min_to_per_hour(scheduled);

        // Log the new sample with the insulin decision still pending.
        self.window.upsert(
            ctx.patient_id,
            ObservationRecord::new(ctx.now, ctx.glucose, None, None, ctx.meal_rate),
        )?;

        let samples = self.window.len(ctx.patient_id);
        let warmup = Self::warmup_samples(ctx.sample_time);

        if samples < warmup {
            // WARMUP: deliver the schedule, never consult the oracle.
            self.window.upsert(
                ctx.patient_id,
                ObservationRecord::new(
                    ctx.now,
                    ctx.glucose,
                    Some(scheduled_per_hr),
                    Some(0.0),
                    ctx.meal_rate,
                ),
            )?;
            return Ok(Action::new(scheduled, 0.0));
        }

        if samples == warmup {
            self.sink.record(&DiagEvent::WarmupCompleted {
                patient_id: ctx.patient_id.to_string(),
                samples,
            });
        }

        let (basal_per_hr, bolus_units, mode) = if ctx.meal_rate > 0.0 {
            // Meal path: manual bolus, basal adjustment fully suppressed.
            let request =
                self.request_for(ctx, scheduled_per_hr, RecommendationMode::ManualBolus, None);
            match self.oracle.recommend(&request)? {
                DoseResponse::Manual { amount } => (0.0, amount, RecommendationMode::ManualBolus),
                DoseResponse::Automatic { .. } => {
                    return Err(SimError::OracleFailure {
                        reason: "manual bolus requested, automatic recommendation returned".into(),
                    })
                }
            }
        } else {
            let request = self.request_for(
                ctx,
                scheduled_per_hr,
                self.automatic_mode,
                Some(MAX_BASAL_MULTIPLIER * scheduled_per_hr),
            );
            match self.oracle.recommend(&request)? {
                DoseResponse::Automatic { basal_adjustment_per_hr, bolus_units } => (
                    basal_adjustment_per_hr,
                    bolus_units.unwrap_or(0.0),
                    self.automatic_mode,
                ),
                DoseResponse::Manual { .. } => {
                    return Err(SimError::OracleFailure {
                        reason: "automatic recommendation requested, manual bolus returned".into(),
                    })
                }
            }
        };

        // Overwrite the pending row with what was actually delivered.
        self.window.upsert(
            ctx.patient_id,
            ObservationRecord::new(
                ctx.now,
                ctx.glucose,
                Some(basal_per_hr),
                Some(bolus_units),
                ctx.meal_rate,
            ),
        )?;

        self.sink.record(&DiagEvent::OracleDecision {
            patient_id: ctx.patient_id.to_string(),
            mode: mode.as_str(),
            basal_per_hr,
            bolus_units,
        });

        Ok(Action::new(
            per_hour_to_per_min(basal_per_hr),
            dose_to_rate(bolus_units, ctx.sample_time),
        ))
    }

    fn reset(&mut self) {
        // Fresh windows for every patient: all of them re-enter warm-up.
        self.window.clear_all();
    }
}
