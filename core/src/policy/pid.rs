//! PID feedback policy.
//!
//! Glucose is the only state variable. The policy keeps its own
//! integrated error and previous reading per controller instance (it
//! assumes single-patient use), and updates them on EVERY call,
//! whichever mode produces the returned action.
//!
//! Fully-automated mode returns the raw control signal as the basal
//! rate — possibly negative. Clamping is deliberately left to the
//! consuming simulator's pump boundary.

use crate::{
    diag::{DiagEvent, SharedSink},
    error::SimResult,
    policy::{BasalBolusPolicy, DosingPolicy, PolicyContext},
    types::Action,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

pub struct PidPolicy {
    gains: PidGains,
    target: f64,
    /// Fully automated: PID output drives basal directly. Otherwise the
    /// returned action comes from the rule-based delegate and the PID
    /// signal is only tracked (the hybrid auto-bolus therapy).
    fully_automated: bool,
    integrated_error: f64,
    previous_glucose: f64,
    /// Held by composition, not inheritance: the delegation is explicit
    /// and testable in isolation.
    delegate: BasalBolusPolicy,
    sink: SharedSink,
}

impl PidPolicy {
    pub fn new(
        gains: PidGains,
        target: f64,
        fully_automated: bool,
        delegate: BasalBolusPolicy,
        sink: SharedSink,
    ) -> Self {
        Self {
            gains,
            target,
            fully_automated,
            integrated_error: 0.0,
            previous_glucose: 0.0,
            delegate,
            sink,
        }
    }

    pub fn integrated_error(&self) -> f64 {
        self.integrated_error
    }

    pub fn previous_glucose(&self) -> f64 {
        self.previous_glucose
    }
}

impl DosingPolicy for PidPolicy {
    fn name(&self) -> &'static str {
        if self.fully_automated { "pid-automated" } else { "pid-bolus" }
    }

    fn decide(&mut self, ctx: &PolicyContext) -> SimResult<Action> {
        ctx.check_sample_time()?;

        let error = ctx.glucose - self.target;
        let control = self.gains.p * error
            + self.gains.i * self.integrated_error
            + self.gains.d * (ctx.glucose - self.previous_glucose) / ctx.sample_time;

        self.sink.record(&DiagEvent::ControlSignal {
            glucose: ctx.glucose,
            control,
        });

        // State update happens unconditionally, after the signal is
        // computed from the previous state.
        self.previous_glucose = ctx.glucose;
        self.integrated_error += error * ctx.sample_time;

        if self.fully_automated {
            Ok(Action::new(control, 0.0))
        } else {
            self.delegate.decide(ctx)
        }
    }

    fn reset(&mut self) {
        self.integrated_error = 0.0;
        self.previous_glucose = 0.0;
        self.delegate.reset();
    }
}
