mod evaluation;
mod fit;

pub use evaluation::Evaluation;
pub use fit::{EpochEnd, Fit};
