use super::{Adam, GradientDescent};
use crate::Result;

/// An `Optimizer` applies a gradient to a set of parameters following its learning rule.
pub trait Optimizer {
    /// Takes a step on `params` using `grad`.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the loss with respect to `params`.
    /// * `params` - The parameters to update in place.
    ///
    /// # Returns
    /// An error if the lengths of `grad` and `params` differ.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}

/// Describes which optimizer to build when compiling a model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OptimizerSpec {
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
    GradientDescent,
}

impl Default for OptimizerSpec {
    fn default() -> Self {
        Self::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

impl OptimizerSpec {
    /// Builds the described optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters it'll update.
    /// * `learning_rate` - The step size.
    ///
    /// # Returns
    /// The optimizer or an error if any hyperparameter is out of range.
    pub fn build(self, len: usize, learning_rate: f32) -> Result<Box<dyn Optimizer + Send + Sync>> {
        let optimizer: Box<dyn Optimizer + Send + Sync> = match self {
            Self::Adam {
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon)?),
            Self::GradientDescent => Box::new(GradientDescent::new(learning_rate)?),
        };

        Ok(optimizer)
    }
}
