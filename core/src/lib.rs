//! Acquisition buffering, session model and trial scoring for motor-board experiments.
//!
//! Live samples flow through bounded rings into the stage scorer; finished trials
//! land in the session, which the aggregator summarises for review and plotting.
//! The same scorer re-evaluates materialized sessions offline.

pub mod math;
pub mod model;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use prelude::{CoreError, CoreResult, ScoringEvent, ScoringRequest, ScoringStrategy};
