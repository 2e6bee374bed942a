use ndarray::{Array2, ArrayView2, Zip};

use super::LossFn;

const EPSILON: f32 = 1e-7;

/// Categorical cross-entropy over one-hot targets.
///
/// Expects `y_pred` to be the output of a softmax layer, `loss_prime` returns the gradient
/// with respect to the softmax *inputs*, which is why `Softmax` has no backward step.
#[derive(Default, Clone, Copy, Debug)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let n = y_pred.nrows().max(1) as f32;
        let total = Zip::from(&y_pred)
            .and(&y)
            .fold(0.0, |acc, &p, &t| acc - t * p.clamp(EPSILON, 1. - EPSILON).ln());

        total / n
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.nrows().max(1) as f32;
        (&y_pred - &y) / n
    }
}
