use ndarray::{ArrayViewMut1, Axis, prelude::*};

/// Normalized exponential over each row of a batch.
///
/// Its derivative is never applied on its own: paired with `CrossEntropy` the
/// gradient with respect to the logits collapses to `y_pred - y`, which is what
/// the loss already returns.
#[derive(Clone, Copy, Debug, Default)]
pub struct Softmax;

impl Softmax {
    pub fn new() -> Self {
        Self
    }

    /// Overwrites every row of `z` with its softmax.
    pub fn apply(&self, mut z: ArrayViewMut2<f32>) {
        z.axis_iter_mut(Axis(0)).for_each(Self::apply_row);
    }

    fn apply_row(mut row: ArrayViewMut1<f32>) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());

        let sum = row.sum();
        if sum > 0. {
            row /= sum;
        }
    }
}
