//! Rule-based bolus-basal policy — the therapy a patient practices by
//! hand. Stateless across steps; serves as the baseline for every other
//! controller and as the delegate for the PID policy's hybrid mode.

use crate::{
    diag::{DiagEvent, SharedSink},
    error::SimResult,
    policy::{DosingPolicy, PolicyContext},
    therapy::{TdiSettings, TherapyLookup},
    types::{dose_to_rate, Action},
};

/// Target glucose, mg/dL.
pub const DEFAULT_TARGET: f64 = 140.0;

/// The correction term applies only strictly above this level. The gap
/// between threshold and target is a dead-band: at 150 mg/dL exactly, no
/// correction is given.
pub const CORRECTION_THRESHOLD: f64 = 150.0;

pub struct BasalBolusPolicy {
    lookup: TherapyLookup,
    target: f64,
    /// When set, basal/ISF/CR are all derived from the patient's total
    /// daily insulin (0.45-, 1800- and 500-rules) instead of the
    /// profile's measured values.
    use_tdi_settings: bool,
    sink: SharedSink,
}

impl BasalBolusPolicy {
    pub fn new(lookup: TherapyLookup, sink: SharedSink) -> Self {
        Self {
            lookup,
            target: DEFAULT_TARGET,
            use_tdi_settings: false,
            sink,
        }
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target = target;
        self
    }

    pub fn with_tdi_settings(mut self, enabled: bool) -> Self {
        self.use_tdi_settings = enabled;
        self
    }

    pub fn target(&self) -> f64 {
        self.target
    }
}

impl DosingPolicy for BasalBolusPolicy {
    fn name(&self) -> &'static str {
        "bolus-basal"
    }

    fn decide(&mut self, ctx: &PolicyContext) -> SimResult<Action> {
        ctx.check_sample_time()?;

        let resolved = self.lookup.resolve(ctx.patient_id);
        let profile = &resolved.profile;

        let (basal, carb_ratio, correction_factor) = if self.use_tdi_settings {
            let s = TdiSettings::from_tdi(profile.total_daily_insulin)?;
            (s.basal, s.carb_ratio, s.correction_factor)
        } else {
            (
                profile.scheduled_basal(),
                profile.carb_ratio,
                profile.correction_factor,
            )
        };

        // Bolus is computed in U, then converted to a rate over the step.
        let bolus_units = if ctx.meal_rate > 0.0 {
            let meal_units = (ctx.meal_rate * ctx.sample_time) / carb_ratio;
            let correction_units = if ctx.glucose > CORRECTION_THRESHOLD {
                (ctx.glucose - self.target) / correction_factor
            } else {
                0.0
            };
            let total = meal_units + correction_units;
            self.sink.record(&DiagEvent::MealBolus {
                patient_id: ctx.patient_id.to_string(),
                glucose: ctx.glucose,
                meal_rate: ctx.meal_rate,
                bolus_units: total,
            });
            total
        } else {
            0.0
        };

        Ok(Action::new(basal, dose_to_rate(bolus_units, ctx.sample_time)))
    }

    fn reset(&mut self) {
        // Stateless.
    }
}
