//! Dose-recommendation oracle adapter.
//!
//! The decision engine itself is an external collaborator consumed as a
//! black box: one blocking request, one response, no retry and no
//! fallback at this layer. This module owns only the wire records and
//! the trait boundary.

use crate::{
    error::SimResult,
    observation::ObservationRecord,
    types::Timestamp,
};
use serde::{Deserialize, Serialize};

/// Insulin preparation label forwarded to the decision engine.
pub const DEFAULT_INSULIN_TYPE: &str = "novolog";

/// What kind of recommendation the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationMode {
    #[serde(rename = "manualBolus")]
    ManualBolus,
    #[serde(rename = "tempBasal")]
    TempBasal,
    #[serde(rename = "automaticBolus")]
    AutomaticBolus,
}

impl RecommendationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualBolus => "manualBolus",
            Self::TempBasal => "tempBasal",
            Self::AutomaticBolus => "automaticBolus",
        }
    }
}

/// A prediction request: the trailing observation series plus the
/// therapy constants the engine needs to project forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseRequest {
    /// Trailing observation series, oldest first, bounded by the caller.
    pub series: Vec<ObservationRecord>,
    /// Scheduled basal rate, U/hr.
    pub scheduled_basal_per_hr: f64,
    /// mg/dL per U.
    pub correction_factor: f64,
    /// g per U.
    pub carb_ratio: f64,
    pub insulin_type: String,
    /// Where the prediction starts — the timestamp of the decision.
    pub prediction_start: Timestamp,
    pub mode: RecommendationMode,
    /// Cap on the recommended basal rate, U/hr. Required for the
    /// automatic modes, absent for manual bolus requests.
    pub max_basal_per_hr: Option<f64>,
}

/// The engine's answer, shaped by the requested mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DoseResponse {
    /// Manual mode: a single bolus amount, U.
    Manual { amount: f64 },
    /// Automatic modes: a basal adjustment (U/hr) and, when the engine
    /// chooses to auto-bolus, a bolus component (U).
    Automatic {
        basal_adjustment_per_hr: f64,
        bolus_units: Option<f64>,
    },
}

/// The blocking request/response boundary to the external engine.
///
/// An implementation that cannot produce a recommendation returns an
/// error; the predictive policy propagates it as fatal for that step.
pub trait DoseOracle: Send {
    fn recommend(&mut self, request: &DoseRequest) -> SimResult<DoseResponse>;
}
