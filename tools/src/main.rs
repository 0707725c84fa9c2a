//! episode-runner: headless closed-loop episode runner.
//!
//! Wires a dosing policy to an episode composer with stub collaborators
//! standing in for the external patient/sensor/oracle, runs a batch of
//! episodes, and prints per-episode summaries.
//!
//! Usage:
//!   episode-runner --seed 42 --episodes 3 --steps 480 \
//!       --policy loop-temp-basal --patient adult#001 --db run.db

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate, Timelike};
use glycosim_core::{
    config::SimConfig,
    diag::log_sink,
    episode::{EpisodeComposer, EpisodeParams, PatientSpec},
    error::SimResult,
    oracle::{DoseOracle, DoseRequest, DoseResponse, RecommendationMode},
    policy::{BasalBolusPolicy, DosingPolicy, LoopPolicy, PidGains, PidPolicy, PolicyContext},
    rng::EpisodeRng,
    session::{GlucoseDynamics, PatientFactory, Scenario, ScenarioSource, Sensor, SensorFactory},
    store::AuditStore,
    therapy::TherapyLookup,
    types::Timestamp,
};
use std::env;

const POLICY_NAMES: [&str; 5] = [
    "bolus-basal",
    "loop-temp-basal",
    "loop-automatic-bolus",
    "pid-automated",
    "pid-bolus",
];

/// Per-episode summary, printable as text or as one JSON line for
/// downstream tooling.
#[derive(serde::Serialize)]
struct EpisodeSummary {
    episode: u64,
    patient: String,
    steps: u64,
    mean_cgm: f64,
    time_in_range_pct: f64,
    total_insulin_units: f64,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let episodes = parse_arg(&args, "--episodes", 1u64);
    let steps = parse_arg(&args, "--steps", 480u64);
    let policy_name = parse_str_arg(&args, "--policy", "bolus-basal");
    let patient = parse_str_arg(&args, "--patient", "adult#001");
    let db = parse_str_arg(&args, "--db", ":memory:");
    let json_output = args.iter().any(|a| a == "--json");

    println!("episode-runner");
    println!("  seed:     {seed}");
    println!("  episodes: {episodes}");
    println!("  steps:    {steps}");
    println!("  policy:   {policy_name}");
    println!("  patient:  {patient}");
    println!("  db:       {db}");
    println!();

    let config = SimConfig::builtin();
    let sink = log_sink();
    let lookup = TherapyLookup::new(config.clone(), sink.clone());
    let mut policy = build_policy(&policy_name, lookup)?;

    let sensor_cfg = match config.sensor("dexcom") {
        Some(s) => s.clone(),
        None => bail!("builtin config is missing the dexcom sensor"),
    };
    let pump_cfg = match config.pump("insulet") {
        Some(p) => p.clone(),
        None => bail!("builtin config is missing the insulet pump"),
    };

    let store = if db == ":memory:" {
        AuditStore::in_memory()?
    } else {
        AuditStore::open(&db)?
    };
    store.migrate()?;

    let params = EpisodeParams {
        patients: PatientSpec::Single(patient.clone()),
        sensor: sensor_cfg,
        pump: pump_cfg,
        max_steps: steps,
        start_date: NaiveDate::from_ymd_opt(2018, 1, 1).expect("valid date"),
    };

    let episode_id = uuid::Uuid::new_v4().to_string();
    let mut composer = EpisodeComposer::new(
        episode_id.clone(),
        params,
        Box::new(StubPatientFactory),
        Box::new(StubSensorFactory),
        Box::new(StubScenarioSource),
        store,
        sink,
    );

    for ep in 0..episodes {
        let (mut cgm, info) = composer.reset(Some(seed.wrapping_add(ep)))?;
        log::info!(
            "episode {ep}: patient={} start={} seeds={:?}",
            info.patient_id,
            info.start_time,
            info.seeds
        );
        policy.reset();

        let dt = composer.sample_time();
        let mut now = info.start_time;
        let mut meal_rate = 0.0;
        let mut in_range = 0u64;
        let mut cgm_sum = 0.0;
        let mut insulin_total = 0.0;
        let mut taken = 0u64;

        for _ in 0..steps {
            let ctx = PolicyContext {
                patient_id: &info.patient_id,
                glucose: cgm,
                meal_rate,
                sample_time: dt,
                now,
            };
            let action = policy.decide(&ctx)?;
            let result = composer.step(&action)?;

            cgm = result.observation;
            // Meal announcement for the next decision: what the scenario
            // actually delivered this step, as a rate.
            meal_rate = result.info.carbs / dt;
            now += Duration::seconds((dt * 60.0) as i64);

            taken += 1;
            cgm_sum += cgm;
            insulin_total += result.info.insulin_rate * dt;
            if (70.0..=180.0).contains(&cgm) {
                in_range += 1;
            }
            if result.terminated || result.truncated {
                break;
            }
        }

        let summary = EpisodeSummary {
            episode: ep,
            patient: info.patient_id.clone(),
            steps: taken,
            mean_cgm: cgm_sum / taken as f64,
            time_in_range_pct: 100.0 * in_range as f64 / taken as f64,
            total_insulin_units: insulin_total,
        };
        if json_output {
            println!("{}", serde_json::to_string(&summary)?);
        } else {
            println!(
                "episode {ep}: steps={} mean_cgm={:.1} mg/dL time_in_range={:.1}% insulin={:.1} U",
                summary.steps, summary.mean_cgm, summary.time_in_range_pct,
                summary.total_insulin_units
            );
        }
    }

    println!();
    println!("episode id: {episode_id}");
    Ok(())
}

fn build_policy(name: &str, lookup: TherapyLookup) -> Result<Box<dyn DosingPolicy>> {
    let sink = log_sink();
    // Gains from the reference dataset generator.
    let gains = PidGains { p: 1e-6, i: 5e-8, d: 0.0 };
    let policy: Box<dyn DosingPolicy> = match name {
        "bolus-basal" => Box::new(BasalBolusPolicy::new(lookup, sink)),
        "loop-temp-basal" => Box::new(
            LoopPolicy::new(lookup, Box::new(StubOracle), sink)
                .with_mode(RecommendationMode::TempBasal),
        ),
        "loop-automatic-bolus" => Box::new(
            LoopPolicy::new(lookup, Box::new(StubOracle), sink)
                .with_mode(RecommendationMode::AutomaticBolus),
        ),
        "pid-automated" => {
            let delegate = BasalBolusPolicy::new(lookup.clone(), sink.clone());
            Box::new(PidPolicy::new(gains, 140.0, true, delegate, sink))
        }
        "pid-bolus" => {
            let delegate = BasalBolusPolicy::new(lookup.clone(), sink.clone());
            Box::new(PidPolicy::new(gains, 140.0, false, delegate, sink))
        }
        _ => bail!("unknown policy '{name}', expected one of {POLICY_NAMES:?}"),
    };
    Ok(policy)
}

// ── Stub collaborators ─────────────────────────────────────────
// Deterministic stand-ins for the external physiological simulator,
// sensor, scenario generator, and dose-recommendation engine. They keep
// the runner self-contained; a deployment binds the real ones.

/// First-order glucose kinetics: meals push glucose up, insulin pulls
/// it down, and the trajectory relaxes toward a basal operating point.
struct StubPatient {
    bg: f64,
}

impl GlucoseDynamics for StubPatient {
    fn glucose(&self) -> f64 {
        self.bg
    }

    fn step(&mut self, insulin_rate: f64, carbs: f64, dt_min: f64) -> f64 {
        let meal_effect = 2.5 * carbs;
        let insulin_effect = 8.0 * insulin_rate * dt_min;
        let relaxation = 0.02 * (130.0 - self.bg) * dt_min;
        self.bg = (self.bg + meal_effect - insulin_effect + relaxation).max(20.0);
        self.bg
    }
}

struct StubPatientFactory;

impl PatientFactory for StubPatientFactory {
    fn create(&self, _patient_id: &str, seed: u64) -> Box<dyn GlucoseDynamics> {
        // Seeded initial glucose in [110, 190).
        let mut rng = EpisodeRng::seed_from(seed);
        Box::new(StubPatient { bg: 110.0 + rng.next_f64() * 80.0 })
    }
}

/// Noise-free sensor: reports plasma glucose as-is.
struct StubSensor;

impl Sensor for StubSensor {
    fn measure(&mut self, glucose: f64) -> f64 {
        glucose
    }
}

struct StubSensorFactory;

impl SensorFactory for StubSensorFactory {
    fn create(&self, _sensor_name: &str, _seed: u64) -> Box<dyn Sensor> {
        Box::new(StubSensor)
    }
}

/// Three meals a day at fixed hours, seeded gram amounts.
struct StubScenario {
    start: Timestamp,
    meals: Vec<(f64, f64)>,
}

impl Scenario for StubScenario {
    fn carbs_during(&mut self, now: Timestamp, dt_min: f64) -> f64 {
        let elapsed = (now - self.start).num_seconds() as f64 / 60.0;
        self.meals
            .iter()
            .filter(|(offset, _)| *offset >= elapsed && *offset < elapsed + dt_min)
            .map(|(_, grams)| grams)
            .sum()
    }
}

struct StubScenarioSource;

impl ScenarioSource for StubScenarioSource {
    fn create(&self, start_time: Timestamp, seed: u64) -> Box<dyn Scenario> {
        let mut rng = EpisodeRng::seed_from(seed);
        let start_hour = f64::from(start_time.hour());
        // Breakfast / lunch / dinner at 07:00, 12:00, 19:00 wall-clock.
        let meals = [7.0, 12.0, 19.0]
            .iter()
            .map(|meal_hour| {
                let offset_hr = (meal_hour - start_hour).rem_euclid(24.0);
                let grams = 30.0 + rng.next_f64() * 50.0;
                (offset_hr * 60.0, grams)
            })
            .collect();
        Box::new(StubScenario { start: start_time, meals })
    }
}

/// Proportional stand-in for the dose-recommendation engine: corrects
/// the latest glucose toward 140 mg/dL within the request's basal cap.
struct StubOracle;

impl DoseOracle for StubOracle {
    fn recommend(&mut self, request: &DoseRequest) -> SimResult<DoseResponse> {
        let latest = request.series.last().map_or(140.0, |r| r.glucose);
        match request.mode {
            RecommendationMode::ManualBolus => {
                let carbs: f64 = request.series.last().and_then(|r| r.carbs).unwrap_or(0.0);
                let amount = carbs / request.carb_ratio.max(1e-9)
                    + ((latest - 140.0) / request.correction_factor.max(1e-9)).max(0.0);
                Ok(DoseResponse::Manual { amount })
            }
            RecommendationMode::TempBasal | RecommendationMode::AutomaticBolus => {
                let cap = request.max_basal_per_hr.unwrap_or(request.scheduled_basal_per_hr);
                let scale = ((latest - 140.0) / 100.0).clamp(-1.0, 1.0);
                let adjusted = (request.scheduled_basal_per_hr * (1.0 + scale)).clamp(0.0, cap);
                let bolus = if request.mode == RecommendationMode::AutomaticBolus && latest > 180.0
                {
                    Some((latest - 180.0) / request.correction_factor.max(1e-9) * 0.5)
                } else {
                    None
                };
                Ok(DoseResponse::Automatic {
                    basal_adjustment_per_hr: adjusted,
                    bolus_units: bolus,
                })
            }
        }
    }
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn parse_str_arg(args: &[String], flag: &str, default: &str) -> String {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .unwrap_or_else(|| default.to_string())
}
