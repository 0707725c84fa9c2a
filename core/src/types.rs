//! Shared primitive types used across the entire controller subsystem.

use serde::{Deserialize, Serialize};

/// Simulation time. All timestamps are naive wall-clock times inside
/// one episode; there is no timezone handling in the simulator.
pub type Timestamp = chrono::NaiveDateTime;

/// A stable patient identifier, e.g. "adult#001".
pub type PatientId = String;

/// The canonical episode identifier.
pub type EpisodeId = String;

/// The sole output contract between a dosing policy and the consuming
/// simulator. Both rates are U/min; any per-hour or per-dose bookkeeping
/// is converted before an Action is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Background insulin delivery rate, U/min.
    pub basal: f64,
    /// Meal/correction insulin expressed as a rate over one step, U/min.
    pub bolus: f64,
}

impl Action {
    pub fn new(basal: f64, bolus: f64) -> Self {
        Self { basal, bolus }
    }

    /// Total insulin delivery rate, U/min.
    pub fn total_rate(&self) -> f64 {
        self.basal + self.bolus
    }
}

/// U/hr → U/min.
pub fn per_hour_to_per_min(rate: f64) -> f64 {
    rate / 60.0
}

/// U/min → U/hr.
pub fn per_min_to_per_hour(rate: f64) -> f64 {
    rate * 60.0
}

/// A dose in U spread over one sample interval → U/min.
pub fn dose_to_rate(units: f64, sample_time_min: f64) -> f64 {
    units / sample_time_min
}
