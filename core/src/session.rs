//! Session plumbing: the seams to the external collaborators and the
//! binder that advances them together.
//!
//! The patient ODE, the sensor noise model, the pump hardware, and the
//! meal-scenario generator all live outside this crate. What lives here
//! is the narrow interface each one is consumed through, and `Session`,
//! which steps the four of them in lock-step once per sample interval.

use crate::{
    config::PumpConfig,
    types::{Action, Timestamp},
};
use chrono::Duration;

/// The physiological simulator boundary. One instance is one patient's
/// glucose trajectory for one episode.
pub trait GlucoseDynamics: Send {
    /// Current plasma glucose, mg/dL.
    fn glucose(&self) -> f64;

    /// Advance the model by one sample interval under the given insulin
    /// delivery rate (U/min) and meal carbohydrates (g over the step).
    /// Returns the new plasma glucose.
    fn step(&mut self, insulin_rate: f64, carbs: f64, dt_min: f64) -> f64;
}

/// CGM sensor boundary. Noise models are the implementor's business.
pub trait Sensor: Send {
    /// Produce a CGM reading (mg/dL) for the given plasma glucose.
    fn measure(&mut self, glucose: f64) -> f64;
}

/// Meal scenario boundary.
pub trait Scenario: Send {
    /// Carbohydrates (g) arriving within [now, now + dt).
    fn carbs_during(&mut self, now: Timestamp, dt_min: f64) -> f64;
}

/// Builds a seeded patient model. The composer hands this the derived
/// patient seed at every reset.
pub trait PatientFactory: Send {
    fn create(&self, patient_id: &str, seed: u64) -> Box<dyn GlucoseDynamics>;
}

/// Builds a seeded sensor.
pub trait SensorFactory: Send {
    fn create(&self, sensor_name: &str, seed: u64) -> Box<dyn Sensor>;
}

/// Builds a scenario for an episode. A supplied (fixed) scenario is a
/// source that ignores the seed; a random generator uses it.
pub trait ScenarioSource: Send {
    fn create(&self, start_time: Timestamp, seed: u64) -> Box<dyn Scenario>;
}

/// A fixed meal schedule: (minutes from episode start, grams).
pub struct ScheduledScenario {
    start: Timestamp,
    meals: Vec<(f64, f64)>,
}

impl ScheduledScenario {
    pub fn new(start: Timestamp, meals: Vec<(f64, f64)>) -> Self {
        Self { start, meals }
    }
}

impl Scenario for ScheduledScenario {
    fn carbs_during(&mut self, now: Timestamp, dt_min: f64) -> f64 {
        let elapsed = (now - self.start).num_seconds() as f64 / 60.0;
        self.meals
            .iter()
            .filter(|(offset, _)| *offset >= elapsed && *offset < elapsed + dt_min)
            .map(|(_, grams)| grams)
            .sum()
    }
}

/// ScenarioSource for a caller-supplied schedule; the scenario seed is
/// deliberately unused.
pub struct FixedScheduleSource {
    pub meals: Vec<(f64, f64)>,
}

impl ScenarioSource for FixedScheduleSource {
    fn create(&self, start_time: Timestamp, _seed: u64) -> Box<dyn Scenario> {
        Box::new(ScheduledScenario::new(start_time, self.meals.clone()))
    }
}

/// What one sample interval produced.
#[derive(Debug, Clone, Copy)]
pub struct SessionStep {
    /// Sensor reading, mg/dL.
    pub cgm: f64,
    /// Plasma glucose, mg/dL.
    pub glucose: f64,
    /// Carbohydrates delivered this step, g.
    pub carbs: f64,
    /// Insulin actually delivered after the pump clamp, U/min.
    pub insulin_rate: f64,
}

/// One bound simulation session: patient + sensor + pump + scenario.
pub struct Session {
    patient: Box<dyn GlucoseDynamics>,
    sensor: Box<dyn Sensor>,
    scenario: Box<dyn Scenario>,
    pump: PumpConfig,
    now: Timestamp,
    sample_time: f64,
}

impl Session {
    pub fn new(
        patient: Box<dyn GlucoseDynamics>,
        sensor: Box<dyn Sensor>,
        scenario: Box<dyn Scenario>,
        pump: PumpConfig,
        start_time: Timestamp,
        sample_time: f64,
    ) -> Self {
        Self { patient, sensor, scenario, pump, now: start_time, sample_time }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn sample_time(&self) -> f64 {
        self.sample_time
    }

    /// First CGM reading of the episode, before any action is applied.
    pub fn initial_cgm(&mut self) -> f64 {
        let bg = self.patient.glucose();
        self.sensor.measure(bg)
    }

    /// Advance one sample interval under the given action.
    ///
    /// The pump clamp happens here: basal is interpreted within
    /// [0, max_basal], bolus within [0, max_bolus] per step. Policies
    /// that emit out-of-range rates (the PID's negative basal) are
    /// brought into range at this boundary, not inside the policy.
    pub fn step(&mut self, action: &Action) -> SessionStep {
        let basal = action.basal.clamp(0.0, self.pump.max_basal);
        let bolus = action
            .bolus
            .clamp(0.0, self.pump.max_bolus / self.sample_time);
        let insulin_rate = basal + bolus;

        let carbs = self.scenario.carbs_during(self.now, self.sample_time);
        let glucose = self.patient.step(insulin_rate, carbs, self.sample_time);

        self.now += Duration::seconds((self.sample_time * 60.0) as i64);
        let cgm = self.sensor.measure(glucose);

        SessionStep { cgm, glucose, carbs, insulin_rate }
    }
}
