/// The result of evaluating a model over a dataset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    /// In `[0, 1]`.
    pub accuracy: f32,
}
