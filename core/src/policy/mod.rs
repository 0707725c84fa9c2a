//! Dosing policies.
//!
//! RULE: Every policy implements DosingPolicy. A policy consumes one
//! glucose observation plus context and returns an insulin Action; the
//! stepping loop calls decide() once per sample interval, in step order,
//! and reset() at episode boundaries. Policies never touch the
//! physiological simulator directly.

mod basal_bolus;
mod loop_policy;
mod pid;

pub use basal_bolus::{BasalBolusPolicy, CORRECTION_THRESHOLD, DEFAULT_TARGET};
pub use loop_policy::{LoopPolicy, WARMUP_MINUTES, WINDOW_HOURS};
pub use pid::{PidGains, PidPolicy};

use crate::{
    error::{SimError, SimResult},
    types::{Action, Timestamp},
};

/// Everything a policy may look at for one decision.
#[derive(Debug, Clone)]
pub struct PolicyContext<'a> {
    pub patient_id: &'a str,
    /// CGM reading, mg/dL.
    pub glucose: f64,
    /// Announced meal disturbance, g/min. Zero or negative means no meal.
    pub meal_rate: f64,
    /// Minutes per environment step. Callers must guarantee > 0.
    pub sample_time: f64,
    /// Decision timestamp.
    pub now: Timestamp,
}

impl PolicyContext<'_> {
    /// Enforce the sample-time precondition once, at the top of every
    /// decide() implementation.
    pub fn check_sample_time(&self) -> SimResult<()> {
        if self.sample_time > 0.0 {
            Ok(())
        } else {
            Err(SimError::InvalidSampleTime { minutes: self.sample_time })
        }
    }
}

/// The contract every dosing policy fulfills.
pub trait DosingPolicy: Send {
    /// Unique stable name for this policy.
    fn name(&self) -> &'static str;

    /// Compute the insulin command for one observation.
    fn decide(&mut self, ctx: &PolicyContext) -> SimResult<Action>;

    /// Clear all internal state (episode boundary).
    fn reset(&mut self);
}
