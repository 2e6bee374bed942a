use std::num::NonZeroUsize;

use machine_learning::{
    Result as MlResult,
    arch::{Sequential, SequentialBuilder, activations::ActFn},
    dataset::Dataset,
    optimization::OptimizerSpec,
    training::{EpochEnd, Evaluation},
};
use ndarray::ArrayD;
use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    configs::{FederationConfig, OptimizerConfig},
    data::DataShape,
};

/// The lazy per-epoch sequence of a fit.
pub type EpochStream<'a> = Box<dyn Iterator<Item = MlResult<EpochEnd>> + Send + 'a>;

/// What the orchestrator needs from a client's model.
pub trait LocalModel: Send + Sync {
    /// Prepares the model for a training run.
    fn compile(&mut self, learning_rate: f32, optimizer: OptimizerConfig) -> MlResult<()>;

    /// Fits the model to `train`, evaluating `validation` after every epoch.
    ///
    /// # Returns
    /// A finite sequence with one item per epoch, which trains as it's consumed.
    fn fit<'a>(
        &'a mut self,
        train: &'a Dataset,
        validation: &'a Dataset,
        epochs: NonZeroUsize,
        batch_size: NonZeroUsize,
    ) -> MlResult<EpochStream<'a>>;

    fn evaluate(&self, data: &Dataset) -> MlResult<Evaluation>;

    /// The parameters as an ordered list of tensors, a kernel and a bias per layer.
    fn weights(&self) -> MlResult<Vec<ArrayD<f32>>>;

    /// Replaces the parameters, in the order `weights` gives them.
    fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> MlResult<()>;
}

/// Builds fresh, untrained models, every one with the same topology.
pub trait ModelFactory: Send + Sync {
    type Model: LocalModel;

    fn build(&self) -> MlResult<Self::Model>;
}

impl LocalModel for Sequential {
    fn compile(&mut self, learning_rate: f32, optimizer: OptimizerConfig) -> MlResult<()> {
        Sequential::compile(self, learning_rate, OptimizerSpec::from(optimizer))
    }

    fn fit<'a>(
        &'a mut self,
        train: &'a Dataset,
        validation: &'a Dataset,
        epochs: NonZeroUsize,
        batch_size: NonZeroUsize,
    ) -> MlResult<EpochStream<'a>> {
        let fit = Sequential::fit(self, train, validation, epochs, batch_size)?;
        Ok(Box::new(fit))
    }

    fn evaluate(&self, data: &Dataset) -> MlResult<Evaluation> {
        Sequential::evaluate(self, data)
    }

    fn weights(&self) -> MlResult<Vec<ArrayD<f32>>> {
        Sequential::weights(self)
    }

    fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> MlResult<()> {
        Sequential::set_weights(self, weights)
    }
}

/// Builds the `features -> hidden (relu) -> classes (softmax)` network.
pub struct NetworkFactory {
    features: usize,
    hidden: usize,
    classes: usize,
    rng: Mutex<StdRng>,
}

impl NetworkFactory {
    /// Creates a new `NetworkFactory`.
    ///
    /// # Arguments
    /// * `shape` - The shape of the data, giving the input and output sizes.
    /// * `hidden` - The units of the hidden layer.
    /// * `seed` - Seeds the initialization of every model built, from entropy if `None`.
    pub fn new(shape: &DataShape, hidden: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            features: shape.features,
            hidden,
            classes: shape.classes,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_config(config: &FederationConfig) -> Self {
        Self::new(&config.shape, config.model.hidden, config.seed)
    }
}

impl ModelFactory for NetworkFactory {
    type Model = Sequential;

    fn build(&self) -> MlResult<Sequential> {
        let mut rng = self.rng.lock();

        SequentialBuilder::new(self.features)
            .dense(self.hidden, Some(ActFn::relu()))
            .dense(self.classes, Some(ActFn::softmax()))
            .build(&mut *rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> DataShape {
        DataShape {
            train_len: 4,
            test_len: 2,
            features: 6,
            classes: 3,
        }
    }

    #[test]
    fn networks_have_two_dense_layers() {
        let factory = NetworkFactory::new(&shape(), 5, Some(1));
        let model = factory.build().unwrap();

        let shapes: Vec<_> = LocalModel::weights(&model)
            .unwrap()
            .iter()
            .map(|w| w.shape().to_vec())
            .collect();
        assert_eq!(shapes, vec![vec![6, 5], vec![5], vec![5, 3], vec![3]]);
    }

    #[test]
    fn every_build_is_a_fresh_initialization() {
        let factory = NetworkFactory::new(&shape(), 5, Some(1));
        let a = factory.build().unwrap();
        let b = factory.build().unwrap();
        assert_ne!(a.params(), b.params());
    }
}
