//! glycosim-core — the controller subsystem of a closed-loop insulin
//! therapy simulator.
//!
//! A patient's glucose trajectory is driven by meals and administered
//! insulin; at each sample interval a dosing policy converts a CGM
//! reading plus per-patient therapy constants into an insulin command.
//! This crate owns the decision policies (rule-based, PID, predictive
//! "Loop"), the per-patient observation history the predictive policy
//! depends on, and the episode composition that binds patient, sensor,
//! pump, and scenario together under one deterministically derived seed
//! tuple.
//!
//! The physiological ODE model, sensor noise models, pump hardware, and
//! the dose-recommendation decision engine are external collaborators,
//! consumed through the traits in `session` and `oracle`.

pub mod config;
pub mod diag;
pub mod episode;
pub mod error;
pub mod observation;
pub mod oracle;
pub mod policy;
pub mod rng;
pub mod session;
pub mod store;
pub mod therapy;
pub mod types;
