use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;
use rand_distr::uniform::Error as UniformError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        tensor: usize,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    Shape(ShapeError),
    NotCompiled,
    EmptyDataset,
    InvalidHyperparameter {
        name: &'static str,
        value: f32,
    },
    NonFinite {
        epoch: usize,
    },
    Init(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::ShapeMismatch {
                tensor,
                got,
                expected,
            } => write!(
                f,
                "Tensor {tensor} has shape {got:?} but the model expects {expected:?}"
            ),
            MlErr::Shape(e) => write!(f, "Invalid array shape: {e}"),
            MlErr::NotCompiled => f.write_str("The model must be compiled before fitting it"),
            MlErr::EmptyDataset => f.write_str("Cannot fit or evaluate over an empty dataset"),
            MlErr::InvalidHyperparameter { name, value } => {
                write!(f, "Invalid value {value} for hyperparameter {name}")
            }
            MlErr::NonFinite { epoch } => {
                write!(f, "The loss diverged to a non finite value at epoch {epoch}")
            }
            MlErr::Init(msg) => write!(f, "Failed to initialize parameters: {msg}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<UniformError> for MlErr {
    fn from(value: UniformError) -> Self {
        Self::Init(value.to_string())
    }
}
