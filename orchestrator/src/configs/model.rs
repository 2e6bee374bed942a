use machine_learning::optimization::OptimizerSpec;
use serde::{Deserialize, Serialize};

/// The local model every client trains: `features -> hidden (relu) -> classes (softmax)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { hidden: 128 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OptimizerConfig {
    Adam {
        #[serde(default = "default_beta1")]
        beta1: f32,
        #[serde(default = "default_beta2")]
        beta2: f32,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
    GradientDescent,
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_epsilon() -> f32 {
    1e-7
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam {
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
        }
    }
}

impl From<OptimizerConfig> for OptimizerSpec {
    fn from(config: OptimizerConfig) -> Self {
        match config {
            OptimizerConfig::Adam {
                beta1,
                beta2,
                epsilon,
            } => Self::Adam {
                beta1,
                beta2,
                epsilon,
            },
            OptimizerConfig::GradientDescent => Self::GradientDescent,
        }
    }
}
