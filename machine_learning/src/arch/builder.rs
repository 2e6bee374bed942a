use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{
    Sequential,
    activations::ActFn,
    layers::Dense,
    loss::CrossEntropy,
};
use crate::{
    MlErr, Result,
    initialization::{ConstParamGen, ParamGen, RandParamGen},
};

/// Builds a `Sequential` of dense layers.
///
/// Kernels are initialized with Glorot (Xavier) uniform and biases with zeros, the loss is
/// categorical cross-entropy.
pub struct SequentialBuilder {
    input: usize,
    layers: Vec<(usize, Option<ActFn>)>,
}

impl SequentialBuilder {
    /// Creates a new `SequentialBuilder`.
    ///
    /// # Arguments
    /// * `input` - The amount of features of every sample.
    pub fn new(input: usize) -> Self {
        Self {
            input,
            layers: Vec::new(),
        }
    }

    /// Appends a dense layer.
    ///
    /// # Arguments
    /// * `units` - The amount of outputs of the layer.
    /// * `act_fn` - The activation applied to those outputs, if any.
    pub fn dense(mut self, units: usize, act_fn: Option<ActFn>) -> Self {
        self.layers.push((units, act_fn));
        self
    }

    /// Builds the model.
    ///
    /// # Arguments
    /// * `rng` - The random source for the initial kernels and the model's own shuffling.
    ///
    /// # Returns
    /// The model or an error if it has no layers or any layer has no units.
    pub fn build<R: Rng>(self, rng: &mut R) -> Result<Sequential> {
        if self.layers.is_empty() {
            return Err(MlErr::Init("a model needs at least one layer".into()));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut params = Vec::new();
        let mut fan_in = self.input;

        for (units, act_fn) in self.layers {
            if fan_in == 0 || units == 0 {
                return Err(MlErr::Init(format!(
                    "a dense layer of {fan_in}x{units} has no weights"
                )));
            }

            let kernel_len = fan_in * units;
            let mut kernel = RandParamGen::xavier_uniform(rng, kernel_len, fan_in, units)?;
            let mut bias = ConstParamGen::new(0., units);

            params.extend(kernel.sample(kernel_len).unwrap_or_default());
            params.extend(bias.sample(units).unwrap_or_default());

            layers.push(Dense::new((fan_in, units), act_fn));
            fan_in = units;
        }

        let loss_fn = Box::new(CrossEntropy::new());
        Sequential::new(layers, params, loss_fn, StdRng::from_rng(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn biases_start_at_zero() {
        let mut rng = StdRng::seed_from_u64(5);
        let model = SequentialBuilder::new(2)
            .dense(3, Some(ActFn::relu()))
            .build(&mut rng)
            .unwrap();

        let weights = model.weights().unwrap();
        assert!(weights[1].iter().all(|&b| b == 0.));
        assert!(weights[0].iter().any(|&w| w != 0.));
    }

    #[test]
    fn same_seed_same_model() {
        let build = || {
            let mut rng = StdRng::seed_from_u64(9);
            SequentialBuilder::new(4)
                .dense(2, None)
                .build(&mut rng)
                .unwrap()
        };

        assert_eq!(build().params(), build().params());
    }

    #[test]
    fn rejects_empty_models() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(SequentialBuilder::new(4).build(&mut rng).is_err());
        assert!(SequentialBuilder::new(4).dense(0, None).build(&mut rng).is_err());
    }
}
