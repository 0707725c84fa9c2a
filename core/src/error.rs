use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid sample time: {minutes} min (caller must guarantee > 0)")]
    InvalidSampleTime { minutes: f64 },

    #[error("Therapy value out of range: {field} = {value}")]
    InvalidTherapyValue { field: &'static str, value: f64 },

    #[error("Dose oracle failed: {reason}")]
    OracleFailure { reason: String },

    #[error("Observation at {actual} precedes the window tail at {tail}")]
    NonMonotonicTimestamp {
        tail: crate::types::Timestamp,
        actual: crate::types::Timestamp,
    },

    #[error("Patient set is empty")]
    EmptyPatientSet,

    #[error("Episode not started: call reset() before step()")]
    EpisodeNotStarted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;
