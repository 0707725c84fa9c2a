//! Therapy profile lookup.
//!
//! Resolves a patient identifier against the reference tables. Unknown
//! identifiers are NOT an error: they resolve to the population-average
//! profile, exactly as a clinic would fall back to standard settings.
//! The result carries a `ProfileSource` tag and the fallback path emits
//! a diagnostics event, so the degradation is silent to the caller but
//! never invisible to the operator.

use crate::{
    config::SimConfig,
    diag::{DiagEvent, SharedSink},
    error::{SimError, SimResult},
};

/// Population-average constants, applied whenever no usable
/// patient-specific record exists.
pub const AVERAGE_CARB_RATIO: f64 = 1.0 / 15.0;
pub const AVERAGE_CORRECTION_FACTOR: f64 = 1.0 / 50.0;
pub const AVERAGE_TOTAL_DAILY_INSULIN: f64 = 50.0;
pub const AVERAGE_STEADY_STATE_INSULIN_NEED: f64 = 1.43;
pub const AVERAGE_BODY_WEIGHT: f64 = 57.0;

/// Per-patient therapy constants. Immutable once resolved for an
/// episode; every field is positive (they all sit in denominators).
#[derive(Debug, Clone, PartialEq)]
pub struct TherapyProfile {
    /// Grams of carbohydrate offset by one unit of insulin.
    pub carb_ratio: f64,
    /// mg/dL of glucose lowered per unit of insulin.
    pub correction_factor: f64,
    /// U/day.
    pub total_daily_insulin: f64,
    /// kg.
    pub body_weight: f64,
    /// pmol/(L·kg).
    pub steady_state_insulin_need: f64,
}

impl TherapyProfile {
    /// The basal rate that holds glucose steady with no disturbance:
    /// u2ss (pmol/(L·kg)) × body weight (kg) / 6000, in U/min.
    pub fn scheduled_basal(&self) -> f64 {
        self.steady_state_insulin_need * self.body_weight / 6000.0
    }

    pub fn population_average() -> Self {
        Self {
            carb_ratio: AVERAGE_CARB_RATIO,
            correction_factor: AVERAGE_CORRECTION_FACTOR,
            total_daily_insulin: AVERAGE_TOTAL_DAILY_INSULIN,
            body_weight: AVERAGE_BODY_WEIGHT,
            steady_state_insulin_need: AVERAGE_STEADY_STATE_INSULIN_NEED,
        }
    }

    fn is_usable(&self) -> bool {
        self.carb_ratio > 0.0
            && self.correction_factor > 0.0
            && self.total_daily_insulin > 0.0
            && self.body_weight > 0.0
            && self.steady_state_insulin_need > 0.0
    }
}

/// Therapy settings derived from the total daily insulin dose alone,
/// for the "use TDI-derived settings" controller mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TdiSettings {
    /// U/min: (0.45 × TDI / 24) / 60.
    pub basal: f64,
    /// 1800-rule correction factor.
    pub correction_factor: f64,
    /// 500-rule carb ratio.
    pub carb_ratio: f64,
}

impl TdiSettings {
    pub fn from_tdi(tdi: f64) -> SimResult<Self> {
        if tdi <= 0.0 {
            return Err(SimError::InvalidTherapyValue {
                field: "total_daily_insulin",
                value: tdi,
            });
        }
        Ok(Self {
            basal: (0.45 * tdi / 24.0) / 60.0,
            correction_factor: 1800.0 / tdi,
            carb_ratio: 500.0 / tdi,
        })
    }
}

/// How a profile was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    /// Patient-specific record from the reference tables.
    Resolved,
    /// Population-average substitution for an unknown or unusable record.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub profile: TherapyProfile,
    pub source: ProfileSource,
}

/// Lookup over the two reference tables. Cheap to clone; policies hold
/// their own copy.
#[derive(Clone)]
pub struct TherapyLookup {
    config: SimConfig,
    sink: SharedSink,
}

impl TherapyLookup {
    pub fn new(config: SimConfig, sink: SharedSink) -> Self {
        Self { config, sink }
    }

    /// Resolve a patient identifier to a therapy profile.
    ///
    /// Match order: exact identifier, then prefix (the query is a prefix
    /// of a table row's name; first hit wins). Anything else — including
    /// a matched row with a non-positive value in a denominator field —
    /// resolves to the population average with a `Fallback` tag.
    pub fn resolve(&self, patient_id: &str) -> ResolvedProfile {
        if let Some(profile) = self.lookup_tables(patient_id) {
            if profile.is_usable() {
                return ResolvedProfile { profile, source: ProfileSource::Resolved };
            }
        }

        self.sink.record(&DiagEvent::ProfileFallback {
            patient_id: patient_id.to_string(),
        });
        ResolvedProfile {
            profile: TherapyProfile::population_average(),
            source: ProfileSource::Fallback,
        }
    }

    fn lookup_tables(&self, patient_id: &str) -> Option<TherapyProfile> {
        let quest = &self.config.quest;
        let params = &self.config.patient_params;

        let q = quest
            .iter()
            .find(|r| r.name == patient_id)
            .or_else(|| quest.iter().find(|r| r.name.starts_with(patient_id)))?;
        let p = params
            .iter()
            .find(|r| r.name == patient_id)
            .or_else(|| params.iter().find(|r| r.name.starts_with(patient_id)))?;

        Some(TherapyProfile {
            carb_ratio: q.carb_ratio,
            correction_factor: q.correction_factor,
            total_daily_insulin: q.total_daily_insulin,
            body_weight: p.body_weight,
            steady_state_insulin_need: p.steady_state_insulin_need,
        })
    }
}
