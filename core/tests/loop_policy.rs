//! Predictive Loop policy tests: warm-up state machine, meal override,
//! automatic modes, and oracle failure semantics.

use chrono::{Duration, NaiveDate};
use glycosim_core::{
    config::SimConfig,
    diag::null_sink,
    error::{SimError, SimResult},
    oracle::{DoseOracle, DoseRequest, DoseResponse, RecommendationMode},
    policy::{DosingPolicy, LoopPolicy, PolicyContext},
    therapy::TherapyLookup,
    types::Timestamp,
};
use std::sync::{Arc, Mutex};

const DT: f64 = 5.0; // minutes; warm-up is 180/5 = 36 samples
const WARMUP: usize = 36;

fn start() -> Timestamp {
    NaiveDate::from_ymd_opt(2018, 1, 1)
        .unwrap()
        .and_hms_opt(6, 0, 0)
        .unwrap()
}

/// Records every request; answers with fixed recommendations.
#[derive(Clone, Default)]
struct RecordingOracle {
    requests: Arc<Mutex<Vec<DoseRequest>>>,
}

impl RecordingOracle {
    fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last(&self) -> DoseRequest {
        self.requests.lock().unwrap().last().cloned().expect("no requests recorded")
    }
}

impl DoseOracle for RecordingOracle {
    fn recommend(&mut self, request: &DoseRequest) -> SimResult<DoseResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match request.mode {
            RecommendationMode::ManualBolus => Ok(DoseResponse::Manual { amount: 4.0 }),
            RecommendationMode::TempBasal => Ok(DoseResponse::Automatic {
                basal_adjustment_per_hr: 1.2,
                bolus_units: None,
            }),
            RecommendationMode::AutomaticBolus => Ok(DoseResponse::Automatic {
                basal_adjustment_per_hr: 0.9,
                bolus_units: Some(2.5),
            }),
        }
    }
}

struct FailingOracle;

impl DoseOracle for FailingOracle {
    fn recommend(&mut self, _request: &DoseRequest) -> SimResult<DoseResponse> {
        Err(SimError::OracleFailure { reason: "engine unavailable".into() })
    }
}

fn loop_policy(oracle: Box<dyn DoseOracle>) -> LoopPolicy {
    let lookup = TherapyLookup::new(SimConfig::builtin(), null_sink());
    LoopPolicy::new(lookup, oracle, null_sink())
}

/// Run n no-meal decisions, returning the last action.
fn feed(policy: &mut LoopPolicy, n: usize) -> glycosim_core::types::Action {
    let mut last = None;
    for i in 0..n {
        let ctx = PolicyContext {
            patient_id: "adult#001",
            glucose: 140.0 + i as f64 * 0.1,
            meal_rate: 0.0,
            sample_time: DT,
            now: start() + Duration::minutes((i as i64) * DT as i64),
        };
        last = Some(policy.decide(&ctx).expect("decide failed"));
    }
    last.expect("n must be > 0")
}

#[test]
fn warmup_returns_schedule_without_consulting_oracle() {
    let oracle = RecordingOracle::default();
    let mut policy = loop_policy(Box::new(oracle.clone()));

    let scheduled = TherapyLookup::new(SimConfig::builtin(), null_sink())
        .resolve("adult#001")
        .profile
        .scheduled_basal();

    // One short of the warm-up threshold: still warming up.
    let action = feed(&mut policy, WARMUP - 1);
    assert_eq!(oracle.count(), 0, "oracle must not be consulted during warm-up");
    assert!((action.basal - scheduled).abs() < 1e-12);
    assert_eq!(action.bolus, 0.0);
}

#[test]
fn warmup_to_active_transition_is_exact() {
    let oracle = RecordingOracle::default();
    let mut policy = loop_policy(Box::new(oracle.clone()));

    feed(&mut policy, WARMUP - 1);
    assert_eq!(oracle.count(), 0);

    // The next observation crosses the threshold.
    feed_one(&mut policy, WARMUP - 1, 0.0);
    assert_eq!(oracle.count(), 1, "the {WARMUP}th sample must go to the oracle");
}

#[test]
fn warmup_logs_scheduled_basal_in_units_per_hour() {
    let oracle = RecordingOracle::default();
    let mut policy = loop_policy(Box::new(oracle.clone()));
    feed(&mut policy, 3);

    let scheduled_per_hr = TherapyLookup::new(SimConfig::builtin(), null_sink())
        .resolve("adult#001")
        .profile
        .scheduled_basal()
        * 60.0;

    let rows = policy.window().tail("adult#001", 3);
    assert_eq!(rows.len(), 3);
    for row in rows {
        assert_eq!(row.basal, Some(scheduled_per_hr), "warm-up rows log the schedule in U/hr");
        assert_eq!(row.bolus, Some(0.0));
    }
}

#[test]
fn meal_forces_manual_bolus_and_suppresses_basal() {
    let oracle = RecordingOracle::default();
    let mut policy = loop_policy(Box::new(oracle.clone()));
    feed(&mut policy, WARMUP);

    let action = feed_one(&mut policy, WARMUP, 1.5);
    let request = oracle.last();

    assert_eq!(request.mode, RecommendationMode::ManualBolus);
    assert_eq!(request.max_basal_per_hr, None);
    assert_eq!(action.basal, 0.0, "basal adjustment is fully suppressed during a meal bolus");
    assert!((action.bolus - 4.0 / DT).abs() < 1e-12, "manual 4 U over {DT} min");
}

#[test]
fn automatic_mode_caps_basal_at_twice_schedule() {
    let oracle = RecordingOracle::default();
    let mut policy = loop_policy(Box::new(oracle.clone()));

    let action = feed(&mut policy, WARMUP);
    let request = oracle.last();

    let scheduled_per_hr = TherapyLookup::new(SimConfig::builtin(), null_sink())
        .resolve("adult#001")
        .profile
        .scheduled_basal()
        * 60.0;

    assert_eq!(request.mode, RecommendationMode::TempBasal);
    let cap = request.max_basal_per_hr.expect("automatic requests carry a basal cap");
    assert!((cap - 2.0 * scheduled_per_hr).abs() < 1e-12);

    // 1.2 U/hr → U/min on the returned action.
    assert!((action.basal - 1.2 / 60.0).abs() < 1e-12);
    assert_eq!(action.bolus, 0.0);
}

#[test]
fn automatic_bolus_mode_converts_bolus_component() {
    let oracle = RecordingOracle::default();
    let lookup = TherapyLookup::new(SimConfig::builtin(), null_sink());
    let mut policy = LoopPolicy::new(lookup, Box::new(oracle.clone()), null_sink())
        .with_mode(RecommendationMode::AutomaticBolus);

    let action = feed(&mut policy, WARMUP);
    assert_eq!(oracle.last().mode, RecommendationMode::AutomaticBolus);
    assert!((action.basal - 0.9 / 60.0).abs() < 1e-12);
    assert!((action.bolus - 2.5 / DT).abs() < 1e-12);
}

#[test]
fn request_series_is_bounded_to_twelve_hours() {
    let oracle = RecordingOracle::default();
    let mut policy = loop_policy(Box::new(oracle.clone()));

    // 12 h at 5-minute samples = 144 rows; feed well past that.
    feed(&mut policy, 200);
    let request = oracle.last();
    assert_eq!(request.series.len(), 144, "series must be the bounded tail");

    // And it must be the most recent rows, in order.
    let glucose: Vec<f64> = request.series.iter().map(|r| r.glucose).collect();
    assert!(glucose.windows(2).all(|w| w[0] < w[1]), "tail must preserve time order");
    let expected_last = 140.0 + 199.0 * 0.1;
    assert!((glucose.last().unwrap() - expected_last).abs() < 1e-9);
}

#[test]
fn oracle_failure_is_fatal_for_the_step() {
    let mut policy = loop_policy(Box::new(FailingOracle));
    feed(&mut policy, WARMUP - 1);

    // Crossing into ACTIVE with a dead oracle: the error propagates.
    let ctx = PolicyContext {
        patient_id: "adult#001",
        glucose: 150.0,
        meal_rate: 0.0,
        sample_time: DT,
        now: start() + Duration::minutes(((WARMUP - 1) as i64) * DT as i64),
    };
    let err = policy.decide(&ctx).unwrap_err();
    assert!(matches!(err, SimError::OracleFailure { .. }), "got {err:?}");
}

#[test]
fn reset_reenters_warmup() {
    let oracle = RecordingOracle::default();
    let mut policy = loop_policy(Box::new(oracle.clone()));

    feed(&mut policy, WARMUP + 5);
    let after_active = oracle.count();
    assert!(after_active > 0);

    policy.reset();
    feed(&mut policy, WARMUP - 1);
    assert_eq!(oracle.count(), after_active, "a fresh window must warm up again");
}

#[test]
fn windows_are_partitioned_by_patient() {
    let oracle = RecordingOracle::default();
    let mut policy = loop_policy(Box::new(oracle.clone()));

    // Warm one patient fully; the other stays cold.
    feed(&mut policy, WARMUP);
    let ctx = PolicyContext {
        patient_id: "child#001",
        glucose: 120.0,
        meal_rate: 0.0,
        sample_time: DT,
        now: start(),
    };
    policy.decide(&ctx).unwrap();
    assert_eq!(
        oracle.count(),
        1,
        "a different patient identifier starts its own warm-up"
    );
}

/// One decision at step index `i`, with the given meal rate.
fn feed_one(policy: &mut LoopPolicy, i: usize, meal_rate: f64) -> glycosim_core::types::Action {
    let ctx = PolicyContext {
        patient_id: "adult#001",
        glucose: 140.0 + i as f64 * 0.1,
        meal_rate,
        sample_time: DT,
        now: start() + Duration::minutes((i as i64) * DT as i64),
    };
    policy.decide(&ctx).expect("decide failed")
}
