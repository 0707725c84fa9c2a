//! Episode composer.
//!
//! Binds one patient, sensor, pump, and scenario into a simulation
//! session and exposes the step/reset contract a reinforcement-learning
//! loop expects. Owns the episode's random stream and the derived seed
//! 4-tuple exclusively; both are regenerated wholesale on every reset.
//!
//! Single-threaded and synchronous: one step at a time, no cancellation.

use crate::{
    config::{PumpConfig, SensorConfig},
    diag::{DiagEvent, SharedSink},
    error::{SimError, SimResult},
    rng::{EpisodeRng, EpisodeSeeds},
    session::{PatientFactory, ScenarioSource, Sensor, SensorFactory, Session},
    store::AuditStore,
    types::{Action, EpisodeId, PatientId, Timestamp},
};
use chrono::NaiveDate;

/// CGM below this terminates the episode (severe hypoglycemia).
pub const GLUCOSE_FLOOR: f64 = 40.0;

/// CGM above this terminates the episode (sensor-credible ceiling).
pub const GLUCOSE_CEILING: f64 = 600.0;

/// Reward shaping over consecutive CGM readings.
pub type RewardFn = fn(prev_cgm: f64, cgm: f64) -> f64;

/// Default reward: +1 in the 70–180 mg/dL target range, −1 below it,
/// −0.4 above it. Callers with a risk-index reward supply their own.
pub fn time_in_range_reward(_prev_cgm: f64, cgm: f64) -> f64 {
    if cgm < 70.0 {
        -1.0
    } else if cgm <= 180.0 {
        1.0
    } else {
        -0.4
    }
}

/// Which patient(s) an episode may bind.
#[derive(Debug, Clone)]
pub enum PatientSpec {
    Single(PatientId),
    /// One member is sampled per reset, off the episode stream.
    Set(Vec<PatientId>),
}

#[derive(Debug, Clone)]
pub struct EpisodeParams {
    pub patients: PatientSpec,
    pub sensor: SensorConfig,
    pub pump: PumpConfig,
    /// Step cap; reaching it truncates (not terminates) the episode.
    pub max_steps: u64,
    /// Calendar date episodes start on; only the hour is randomized.
    pub start_date: NaiveDate,
}

/// Everything reset() reports alongside the first observation.
#[derive(Debug, Clone)]
pub struct ResetInfo {
    pub episode_id: EpisodeId,
    pub patient_id: PatientId,
    pub seeds: EpisodeSeeds,
    pub start_time: Timestamp,
}

#[derive(Debug, Clone)]
pub struct StepInfo {
    pub step: u64,
    pub patient_id: PatientId,
    /// Plasma glucose, mg/dL (the CGM input, pre-noise).
    pub glucose: f64,
    /// Carbohydrates delivered this step, g.
    pub carbs: f64,
    /// Insulin delivered after the pump clamp, U/min.
    pub insulin_rate: f64,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    /// The CGM reading, mg/dL — the scalar observation.
    pub observation: f64,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

pub struct EpisodeComposer {
    episode_id: EpisodeId,
    params: EpisodeParams,
    patient_factory: Box<dyn PatientFactory>,
    sensor_factory: Box<dyn SensorFactory>,
    scenario_source: Box<dyn ScenarioSource>,
    reward_fn: RewardFn,
    rng: EpisodeRng,
    store: AuditStore,
    sink: SharedSink,

    session: Option<Session>,
    seeds: Option<EpisodeSeeds>,
    patient_id: Option<PatientId>,
    step_count: u64,
    last_cgm: f64,
}

impl EpisodeComposer {
    pub fn new(
        episode_id: EpisodeId,
        params: EpisodeParams,
        patient_factory: Box<dyn PatientFactory>,
        sensor_factory: Box<dyn SensorFactory>,
        scenario_source: Box<dyn ScenarioSource>,
        store: AuditStore,
        sink: SharedSink,
    ) -> Self {
        Self {
            episode_id,
            params,
            patient_factory,
            sensor_factory,
            scenario_source,
            reward_fn: time_in_range_reward,
            rng: EpisodeRng::seed_from(0),
            store,
            sink,
            session: None,
            seeds: None,
            patient_id: None,
            step_count: 0,
            last_cgm: 0.0,
        }
    }

    pub fn with_reward(mut self, reward_fn: RewardFn) -> Self {
        self.reward_fn = reward_fn;
        self
    }

    /// Compose a fresh episode.
    ///
    /// Same root seed ⇒ identical derived 4-tuple, identical patient and
    /// start-time draws, identical trajectory (given deterministic
    /// collaborators). With no seed, the next root comes off the
    /// composer's current stream.
    pub fn reset(&mut self, seed: Option<u64>) -> SimResult<(f64, ResetInfo)> {
        let root = seed.unwrap_or_else(|| self.rng.next_u64());
        self.rng = EpisodeRng::seed_from(root);

        // Draw order is part of the reproducibility contract:
        // seeds, then start hour, then patient sampling.
        let seeds = EpisodeSeeds::derive(&mut self.rng);
        let hour = self.rng.next_u64_below(24) as u32;
        let patient_id = self.sample_patient()?;

        let start_time = self
            .params
            .start_date
            .and_hms_opt(hour, 0, 0)
            .expect("hour < 24 is always a valid time");

        let scenario = self.scenario_source.create(start_time, seeds.scenario);
        let sensor: Box<dyn Sensor> =
            self.sensor_factory.create(&self.params.sensor.name, seeds.sensor);
        let patient = self.patient_factory.create(&patient_id, seeds.patient);

        let mut session = Session::new(
            patient,
            sensor,
            scenario,
            self.params.pump.clone(),
            start_time,
            self.params.sensor.sample_time_min,
        );
        let cgm = session.initial_cgm();

        self.store
            .insert_episode(&self.episode_id, root, &seeds, &patient_id, start_time)?;
        self.sink.record(&DiagEvent::EpisodeComposed {
            patient_id: patient_id.clone(),
            start_time,
        });

        self.session = Some(session);
        self.seeds = Some(seeds);
        self.patient_id = Some(patient_id.clone());
        self.step_count = 0;
        self.last_cgm = cgm;

        Ok((
            cgm,
            ResetInfo { episode_id: self.episode_id.clone(), patient_id, seeds, start_time },
        ))
    }

    /// Advance one sample interval under the given action.
    pub fn step(&mut self, action: &Action) -> SimResult<StepResult> {
        let session = self.session.as_mut().ok_or(SimError::EpisodeNotStarted)?;
        let patient_id = self
            .patient_id
            .clone()
            .ok_or(SimError::EpisodeNotStarted)?;

        let outcome = session.step(action);
        self.step_count += 1;

        let reward = (self.reward_fn)(self.last_cgm, outcome.cgm);
        let terminated = outcome.cgm < GLUCOSE_FLOOR || outcome.cgm > GLUCOSE_CEILING;
        let truncated = !terminated && self.step_count >= self.params.max_steps;
        self.last_cgm = outcome.cgm;

        self.store.append_step(
            &self.episode_id,
            self.step_count,
            outcome.cgm,
            action,
            outcome.carbs,
            reward,
        )?;

        Ok(StepResult {
            observation: outcome.cgm,
            reward,
            terminated,
            truncated,
            info: StepInfo {
                step: self.step_count,
                patient_id,
                glucose: outcome.glucose,
                carbs: outcome.carbs,
                insulin_rate: outcome.insulin_rate,
            },
        })
    }

    /// The derived seed tuple of the current episode, if one is active.
    pub fn seeds(&self) -> Option<EpisodeSeeds> {
        self.seeds
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    /// Upper bound of the action's basal range, from the pump config.
    pub fn max_basal(&self) -> f64 {
        self.params.pump.max_basal
    }

    /// Sample interval, minutes — the policy's sample_time.
    pub fn sample_time(&self) -> f64 {
        self.params.sensor.sample_time_min
    }

    pub fn store(&self) -> &AuditStore {
        &self.store
    }

    fn sample_patient(&mut self) -> SimResult<PatientId> {
        match &self.params.patients {
            PatientSpec::Single(id) => Ok(id.clone()),
            PatientSpec::Set(ids) => {
                if ids.is_empty() {
                    return Err(SimError::EmptyPatientSet);
                }
                let idx = self.rng.next_u64_below(ids.len() as u64) as usize;
                Ok(ids[idx].clone())
            }
        }
    }
}
