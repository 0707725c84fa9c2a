//! Reference configuration: therapy tables and hardware catalogs.
//!
//! Two therapy tables mirror the clinical reference data the controllers
//! consume: the quest table (carb ratio, correction factor, total daily
//! insulin, age) and the patient parameter table (steady-state insulin
//! need, body weight). Sensors and pumps are external hardware; only
//! their configuration records live here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the quest table, keyed by patient identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestRecord {
    pub name: String,
    /// Grams of carbohydrate offset by one unit of insulin.
    pub carb_ratio: f64,
    /// mg/dL of glucose lowered per unit of insulin.
    pub correction_factor: f64,
    /// U/day.
    pub total_daily_insulin: f64,
    pub age: u32,
}

/// One row of the patient parameter table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientParamsRecord {
    pub name: String,
    /// Steady-state insulin need, pmol/(L·kg).
    pub steady_state_insulin_need: f64,
    /// kg.
    pub body_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    /// Minutes between CGM samples. This is the environment step size.
    pub sample_time_min: f64,
}

/// Pump hardware configuration. The pump itself is an external
/// collaborator; the composer only consumes these limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    pub name: String,
    /// Hard cap on the basal rate, U/min. Action.basal is interpreted
    /// within [0, max_basal] at the stepping boundary.
    pub max_basal: f64,
    /// Largest single bolus, U.
    pub max_bolus: f64,
    /// Bolus delivery increment, U.
    pub inc_bolus: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct QuestFile {
    patients: Vec<QuestRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct PatientParamsFile {
    patients: Vec<PatientParamsRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct SensorsFile {
    sensors: Vec<SensorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct PumpsFile {
    pumps: Vec<PumpConfig>,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub quest: Vec<QuestRecord>,
    pub patient_params: Vec<PatientParamsRecord>,
    pub sensors: HashMap<String, SensorConfig>,
    pub pumps: HashMap<String, PumpConfig>,
}

impl SimConfig {
    /// Load from the data/ directory.
    /// Callers that don't ship data files use SimConfig::builtin().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let quest_path = format!("{data_dir}/therapy/quest.json");
        let quest_content = std::fs::read_to_string(&quest_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {quest_path}: {e}"))?;
        let quest_file: QuestFile = serde_json::from_str(&quest_content)?;

        let params_path = format!("{data_dir}/therapy/patient_params.json");
        let params_content = std::fs::read_to_string(&params_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {params_path}: {e}"))?;
        let params_file: PatientParamsFile = serde_json::from_str(&params_content)?;

        let sensors_path = format!("{data_dir}/hardware/sensors.json");
        let sensors_content = std::fs::read_to_string(&sensors_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {sensors_path}: {e}"))?;
        let sensors_file: SensorsFile = serde_json::from_str(&sensors_content)?;
        let sensors = sensors_file
            .sensors
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();

        let pumps_path = format!("{data_dir}/hardware/pumps.json");
        let pumps_content = std::fs::read_to_string(&pumps_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {pumps_path}: {e}"))?;
        let pumps_file: PumpsFile = serde_json::from_str(&pumps_content)?;
        let pumps = pumps_file
            .pumps
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();

        Ok(Self {
            quest: quest_file.patients,
            patient_params: params_file.patients,
            sensors,
            pumps,
        })
    }

    /// The embedded reference tables: three cohorts of three virtual
    /// patients each, plus the stock sensor and pump catalog.
    pub fn builtin() -> Self {
        let quest = vec![
            quest("adult#001", 10.0, 42.0, 48.0, 61),
            quest("adult#002", 9.0, 40.0, 53.0, 65),
            quest("adult#003", 12.0, 46.0, 44.0, 27),
            quest("adolescent#001", 14.0, 35.0, 38.0, 16),
            quest("adolescent#002", 13.0, 31.0, 42.0, 18),
            quest("adolescent#003", 16.0, 44.0, 33.0, 14),
            quest("child#001", 25.0, 78.0, 18.0, 9),
            quest("child#002", 22.0, 70.0, 21.0, 10),
            quest("child#003", 28.0, 86.0, 16.0, 7),
        ];
        let patient_params = vec![
            params("adult#001", 1.66, 89.2),
            params("adult#002", 1.52, 76.4),
            params("adult#003", 1.81, 82.7),
            params("adolescent#001", 1.90, 54.3),
            params("adolescent#002", 1.71, 47.8),
            params("adolescent#003", 1.48, 61.2),
            params("child#001", 1.32, 31.5),
            params("child#002", 1.41, 36.0),
            params("child#003", 1.25, 27.9),
        ];
        let sensors = [
            SensorConfig { name: "dexcom".into(), sample_time_min: 3.0 },
            SensorConfig { name: "guardian_rt".into(), sample_time_min: 5.0 },
        ]
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect();
        let pumps = [
            PumpConfig {
                name: "insulet".into(),
                max_basal: 0.5, // 30 U/hr
                max_bolus: 30.0,
                inc_bolus: 0.05,
            },
            PumpConfig {
                name: "cozmo".into(),
                max_basal: 0.583, // 35 U/hr
                max_bolus: 75.0,
                inc_bolus: 0.05,
            },
        ]
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect();

        Self { quest, patient_params, sensors, pumps }
    }

    pub fn sensor(&self, name: &str) -> Option<&SensorConfig> {
        self.sensors.get(name)
    }

    pub fn pump(&self, name: &str) -> Option<&PumpConfig> {
        self.pumps.get(name)
    }

    /// All patient identifiers present in both therapy tables.
    pub fn patient_ids(&self) -> Vec<String> {
        self.quest
            .iter()
            .filter(|q| self.patient_params.iter().any(|p| p.name == q.name))
            .map(|q| q.name.clone())
            .collect()
    }
}

fn quest(name: &str, cr: f64, cf: f64, tdi: f64, age: u32) -> QuestRecord {
    QuestRecord {
        name: name.into(),
        carb_ratio: cr,
        correction_factor: cf,
        total_daily_insulin: tdi,
        age,
    }
}

fn params(name: &str, u2ss: f64, bw: f64) -> PatientParamsRecord {
    PatientParamsRecord {
        name: name.into(),
        steady_state_insulin_need: u2ss,
        body_weight: bw,
    }
}
