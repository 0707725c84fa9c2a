//! PID feedback policy tests.

use chrono::NaiveDate;
use glycosim_core::{
    config::SimConfig,
    diag::null_sink,
    error::SimError,
    policy::{BasalBolusPolicy, DosingPolicy, PidGains, PidPolicy, PolicyContext},
    therapy::TherapyLookup,
    types::Timestamp,
};

fn ts() -> Timestamp {
    NaiveDate::from_ymd_opt(2018, 1, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

fn ctx(glucose: f64, meal_rate: f64, sample_time: f64) -> PolicyContext<'static> {
    PolicyContext { patient_id: "adult#001", glucose, meal_rate, sample_time, now: ts() }
}

fn pid(gains: PidGains, fully_automated: bool) -> PidPolicy {
    let lookup = TherapyLookup::new(SimConfig::builtin(), null_sink());
    let delegate = BasalBolusPolicy::new(lookup, null_sink());
    PidPolicy::new(gains, 140.0, fully_automated, delegate, null_sink())
}

#[test]
fn two_calls_accumulate_integrated_error() {
    let mut p = pid(PidGains { p: 0.5, i: 0.2, d: 0.1 }, true);
    let dt = 5.0;

    // Call 1: g1 = 180. Old state: integrated 0, previous 0.
    // control = 0.5*40 + 0.2*0 + 0.1*(180 - 0)/5 = 20 + 3.6 = 23.6
    let a1 = p.decide(&ctx(180.0, 0.0, dt)).unwrap();
    assert!((a1.basal - 23.6).abs() < 1e-9, "first control signal: {}", a1.basal);
    assert_eq!(a1.bolus, 0.0);

    // Call 2: g2 = 160. The D-term must use g1 as previous glucose.
    // control = 0.5*20 + 0.2*(40*5) + 0.1*(160 - 180)/5 = 10 + 40 - 0.4
    let a2 = p.decide(&ctx(160.0, 0.0, dt)).unwrap();
    assert!((a2.basal - 49.6).abs() < 1e-9, "second control signal: {}", a2.basal);

    // integrated_error = (g1 - target)*dt + (g2 - target)*dt
    let expected = (180.0 - 140.0) * dt + (160.0 - 140.0) * dt;
    assert!((p.integrated_error() - expected).abs() < 1e-9);
    assert_eq!(p.previous_glucose(), 160.0);
}

#[test]
fn fully_automated_can_go_negative() {
    // Below target, the raw control signal is negative; the policy must
    // NOT clamp — that's the consuming simulator's pump boundary.
    let mut p = pid(PidGains { p: 1.0, i: 0.0, d: 0.0 }, true);
    let action = p.decide(&ctx(100.0, 0.0, 5.0)).unwrap();
    assert!(action.basal < 0.0, "expected negative basal, got {}", action.basal);
    assert_eq!(action.bolus, 0.0);
}

#[test]
fn hybrid_mode_delegates_but_still_tracks_state() {
    let mut p = pid(PidGains { p: 0.5, i: 0.2, d: 0.1 }, false);

    // With no meal, the delegated rule-based action is schedule-only.
    let action = p.decide(&ctx(180.0, 0.0, 5.0)).unwrap();
    let scheduled = {
        let lookup = TherapyLookup::new(SimConfig::builtin(), null_sink());
        lookup.resolve("adult#001").profile.scheduled_basal()
    };
    assert!((action.basal - scheduled).abs() < 1e-12);
    assert_eq!(action.bolus, 0.0);

    // PID state advanced even though its signal was discarded.
    assert!((p.integrated_error() - (180.0 - 140.0) * 5.0).abs() < 1e-9);
    assert_eq!(p.previous_glucose(), 180.0);
}

#[test]
fn hybrid_mode_boluses_for_meals() {
    let mut p = pid(PidGains { p: 1e-6, i: 5e-8, d: 0.0 }, false);
    let action = p.decide(&ctx(200.0, 2.0, 5.0)).unwrap();
    assert!(action.bolus > 0.0, "meal must produce a bolus in hybrid mode");
}

#[test]
fn reset_clears_state() {
    let mut p = pid(PidGains { p: 0.5, i: 0.2, d: 0.1 }, true);
    p.decide(&ctx(200.0, 0.0, 5.0)).unwrap();
    assert!(p.integrated_error() != 0.0);

    p.reset();
    assert_eq!(p.integrated_error(), 0.0);
    assert_eq!(p.previous_glucose(), 0.0);
}

#[test]
fn zero_sample_time_is_rejected_before_state_update() {
    let mut p = pid(PidGains { p: 0.5, i: 0.2, d: 0.1 }, true);
    let err = p.decide(&ctx(180.0, 0.0, 0.0)).unwrap_err();
    assert!(matches!(err, SimError::InvalidSampleTime { .. }));
    // The failed call must not have touched the state.
    assert_eq!(p.integrated_error(), 0.0);
    assert_eq!(p.previous_glucose(), 0.0);
}
