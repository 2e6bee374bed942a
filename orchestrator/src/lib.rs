//! Simulates federated learning: several clients train a local model on their private data
//! partition, and a coordinator periodically averages their parameters into a global model
//! and scores it on a held-out set.

pub mod aggregation;
pub mod client;
pub mod command;
pub mod configs;
pub mod data;
pub mod error;
pub mod evaluation;
mod guard;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod round;
pub mod sampler;
#[cfg(test)]
mod testing;
pub mod trainer;

pub use client::{ClientId, Hyperparameter, Hyperparameters, TrainingRun};
pub use command::{Command, CommandOutcome, Selection};
pub use configs::FederationConfig;
pub use data::PartitionMode;
pub use error::{DataError, FederationError, Result};
pub use round::{RoundOrchestrator, RoundOutcome, RoundReport, TrainingReport};
