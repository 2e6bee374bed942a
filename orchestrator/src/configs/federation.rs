use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ModelConfig, OptimizerConfig};
use crate::{
    client::Hyperparameters,
    data::{DataShape, PartitionMode},
    error::{FederationError, Result},
};

/// Where the client partitions come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DataConfig {
    /// `<root>/<mode>/client<id>.json` files.
    JsonDir { root: PathBuf },
    /// Generated in memory.
    Synthetic {
        #[serde(default)]
        seed: u64,
    },
}

impl Default for DataConfig {
    fn default() -> Self {
        Self::JsonDir {
            root: PathBuf::from("data"),
        }
    }
}

/// Everything needed to set up a federation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub clients: usize,
    pub data: DataConfig,
    /// The partition mode loaded on initialization.
    pub mode: PartitionMode,
    /// Probability of every client being included in an aggregation, historically labeled
    /// as a dropout probability.
    pub participation: f32,
    /// Seeds the participation sampler and the model initialization, from entropy if absent.
    pub seed: Option<u64>,
    pub rounds: usize,
    /// The initial hyperparameters of every client.
    pub hyperparameters: Hyperparameters,
    pub model: ModelConfig,
    pub optimizer: OptimizerConfig,
    pub shape: DataShape,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            clients: 5,
            data: DataConfig::default(),
            mode: PartitionMode::Iid,
            participation: 1.0,
            seed: None,
            rounds: 1,
            hyperparameters: Hyperparameters::default(),
            model: ModelConfig::default(),
            optimizer: OptimizerConfig::default(),
            shape: DataShape::default(),
        }
    }
}

impl FederationConfig {
    /// Reads a config from a JSON file, missing fields take their default.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            FederationError::InvalidConfig(format!("invalid JSON in '{}': {e}", path.display()))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks every value before anything is built.
    pub fn validate(&self) -> Result<()> {
        if self.clients == 0 {
            return Err(FederationError::InvalidConfig(
                "at least one client is required".into(),
            ));
        }

        validate_participation(self.participation)?;
        self.hyperparameters.validate()?;

        if self.model.hidden == 0 {
            return Err(FederationError::InvalidConfig(
                "model.hidden must be greater than 0".into(),
            ));
        }

        let DataShape {
            train_len,
            test_len,
            features,
            classes,
        } = self.shape;

        if train_len == 0 || test_len == 0 {
            return Err(FederationError::InvalidConfig(format!(
                "every split needs samples, got train_len {train_len} and test_len {test_len}"
            )));
        }

        if features == 0 || classes == 0 {
            return Err(FederationError::InvalidConfig(format!(
                "shape needs features and classes, got {features} features and {classes} classes"
            )));
        }

        if let OptimizerConfig::Adam {
            beta1,
            beta2,
            epsilon,
        } = self.optimizer
        {
            for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
                if !(0. ..1.).contains(&beta) {
                    return Err(FederationError::InvalidConfig(format!(
                        "optimizer.{name} must be in [0, 1), got {beta}"
                    )));
                }
            }

            if !epsilon.is_finite() || epsilon <= 0. {
                return Err(FederationError::InvalidConfig(format!(
                    "optimizer.epsilon must be positive, got {epsilon}"
                )));
            }
        }

        Ok(())
    }
}

pub(crate) fn validate_participation(participation: f32) -> Result<()> {
    if !(0. ..=1.).contains(&participation) {
        return Err(FederationError::InvalidConfig(format!(
            "participation must be in [0, 1], got {participation}"
        )));
    }

    Ok(())
}
