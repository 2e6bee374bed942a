pub mod activations;
mod builder;
pub mod layers;
pub mod loss;
mod sequential;

pub use builder::SequentialBuilder;
pub use sequential::Sequential;
