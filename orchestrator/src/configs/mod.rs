mod federation;
mod model;

pub(crate) use federation::validate_participation;
pub use federation::{DataConfig, FederationConfig};
pub use model::{ModelConfig, OptimizerConfig};
