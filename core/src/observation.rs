//! Per-patient observation window store.
//!
//! RULE: the store exposes exactly two mutations — upsert at the tail
//! timestamp — and two reads — sample count and bounded tail query.
//! Rows are retained for the whole episode for audit/export, but the
//! policies only ever read a bounded trailing slice. Out-of-order
//! insertion is a contract violation, rejected explicitly.

use crate::{
    error::{SimError, SimResult},
    types::{PatientId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One logged sample: what the controller saw and what it delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub timestamp: Timestamp,
    /// CGM reading, mg/dL.
    pub glucose: f64,
    /// Basal delivered over this sample, U/hr. None while the decision
    /// for this timestamp is still pending.
    pub basal: Option<f64>,
    /// Bolus delivered over this sample, U. None while pending.
    pub bolus: Option<f64>,
    /// Meal carbohydrates, g/min. Never Some(x) with x <= 0: no meal is
    /// stored as absence, not as a zero value.
    pub carbs: Option<f64>,
}

impl ObservationRecord {
    /// Build a record, normalizing carbs <= 0 to "no meal".
    pub fn new(
        timestamp: Timestamp,
        glucose: f64,
        basal: Option<f64>,
        bolus: Option<f64>,
        carbs: f64,
    ) -> Self {
        Self {
            timestamp,
            glucose,
            basal,
            bolus,
            carbs: if carbs > 0.0 { Some(carbs) } else { None },
        }
    }
}

/// Append-only, time-ordered observation log keyed by patient.
///
/// Partitioned by patient identifier: windows for different patients
/// share no state, so stepping different patients concurrently is safe
/// as long as each partition is driven by one stepper.
#[derive(Debug, Default)]
pub struct ObservationWindow {
    rows: HashMap<PatientId, Vec<ObservationRecord>>,
}

impl ObservationWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, or overwrite the tail record when the timestamp
    /// matches it exactly (the pending-decision update path). Timestamps
    /// must be monotonically non-decreasing per patient.
    pub fn upsert(&mut self, patient_id: &str, record: ObservationRecord) -> SimResult<()> {
        let rows = self.rows.entry(patient_id.to_string()).or_default();
        match rows.last() {
            Some(last) if record.timestamp == last.timestamp => {
                let idx = rows.len() - 1;
                rows[idx] = record;
            }
            Some(last) if record.timestamp < last.timestamp => {
                return Err(SimError::NonMonotonicTimestamp {
                    tail: last.timestamp,
                    actual: record.timestamp,
                });
            }
            _ => rows.push(record),
        }
        Ok(())
    }

    /// Number of samples recorded for a patient.
    pub fn len(&self, patient_id: &str) -> usize {
        self.rows.get(patient_id).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, patient_id: &str) -> bool {
        self.len(patient_id) == 0
    }

    /// The most recent `k` records in original time order. Returns fewer
    /// when the patient has fewer; this is the only read path policies use.
    pub fn tail(&self, patient_id: &str, k: usize) -> &[ObservationRecord] {
        match self.rows.get(patient_id) {
            Some(rows) => {
                let start = rows.len().saturating_sub(k);
                &rows[start..]
            }
            None => &[],
        }
    }

    /// Drop a patient's history. Re-enters the predictive policy's
    /// warm-up for that patient.
    pub fn clear(&mut self, patient_id: &str) {
        self.rows.remove(patient_id);
    }

    /// Drop all history (episode boundary).
    pub fn clear_all(&mut self) {
        self.rows.clear();
    }
}
