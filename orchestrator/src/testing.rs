//! Doubles for the model library and the data source.

use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use machine_learning::{
    MlErr, Result as MlResult,
    dataset::Dataset,
    training::{EpochEnd, Evaluation},
};
use ndarray::{ArrayD, IxDyn};

use crate::{
    client::ClientId,
    configs::{DataConfig, FederationConfig, OptimizerConfig},
    data::{DataShape, DataSource, PartitionMode, RawPartition, SyntheticSource},
    error::DataError,
    model::{EpochStream, LocalModel, ModelFactory},
};

pub(crate) fn shape() -> DataShape {
    DataShape {
        train_len: 8,
        test_len: 4,
        features: 4,
        classes: 2,
    }
}

pub(crate) fn config() -> FederationConfig {
    FederationConfig {
        data: DataConfig::Synthetic { seed: 1 },
        seed: Some(1),
        shape: shape(),
        ..Default::default()
    }
}

/// Adds one to every parameter per epoch and reports a fixed accuracy.
pub(crate) struct MockModel {
    weights: Vec<ArrayD<f32>>,
    accuracy: f32,
    fail_fit: Arc<AtomicBool>,
}

impl LocalModel for MockModel {
    fn compile(&mut self, learning_rate: f32, _: OptimizerConfig) -> MlResult<()> {
        if learning_rate <= 0. {
            return Err(MlErr::InvalidHyperparameter {
                name: "learning_rate",
                value: learning_rate,
            });
        }

        Ok(())
    }

    fn fit<'a>(
        &'a mut self,
        _: &'a Dataset,
        _: &'a Dataset,
        epochs: NonZeroUsize,
        _: NonZeroUsize,
    ) -> MlResult<EpochStream<'a>> {
        let fail = self.fail_fit.load(Ordering::SeqCst);
        let epochs = (1..=epochs.get()).map(move |epoch| {
            if fail && epoch == 2 {
                return Err(MlErr::NonFinite { epoch });
            }

            self.weights.iter_mut().for_each(|w| *w += 1.);
            Ok(EpochEnd {
                epoch,
                loss: 1. / epoch as f32,
                val_loss: 1. / epoch as f32,
                val_accuracy: self.accuracy,
            })
        });

        Ok(Box::new(epochs))
    }

    fn evaluate(&self, _: &Dataset) -> MlResult<Evaluation> {
        Ok(Evaluation {
            loss: 0.5,
            accuracy: self.accuracy,
        })
    }

    fn weights(&self) -> MlResult<Vec<ArrayD<f32>>> {
        Ok(self.weights.clone())
    }

    fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> MlResult<()> {
        if weights.len() != self.weights.len() {
            return Err(MlErr::SizeMismatch {
                what: "tensors",
                got: weights.len(),
                expected: self.weights.len(),
            });
        }

        self.weights = weights.to_vec();
        Ok(())
    }
}

impl MockModel {
    pub(crate) fn weights_sum(&self) -> f32 {
        self.weights.iter().map(|w| w.sum()).sum()
    }
}

/// Counts the models it builds. Raising `fail_fit` makes every one of them fail its second
/// epoch, including the ones already built.
pub(crate) struct MockFactory {
    pub(crate) builds: AtomicUsize,
    pub(crate) fail_fit: Arc<AtomicBool>,
    pub(crate) accuracy: f32,
}

impl MockFactory {
    pub(crate) fn new(accuracy: f32) -> Self {
        Self {
            builds: AtomicUsize::new(0),
            fail_fit: Arc::new(AtomicBool::new(false)),
            accuracy,
        }
    }

    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ModelFactory for MockFactory {
    type Model = MockModel;

    fn build(&self) -> MlResult<MockModel> {
        self.builds.fetch_add(1, Ordering::SeqCst);

        Ok(MockModel {
            weights: vec![ArrayD::zeros(IxDyn(&[2, 3])), ArrayD::zeros(IxDyn(&[3]))],
            accuracy: self.accuracy,
            fail_fit: Arc::clone(&self.fail_fit),
        })
    }
}

/// Synthetic partitions, except for one client that can't be read, either in every mode or
/// only in `broken_mode`.
pub(crate) struct FlakySource {
    inner: SyntheticSource,
    pub(crate) broken: Option<ClientId>,
    pub(crate) broken_mode: Option<PartitionMode>,
    pub(crate) loads: AtomicUsize,
}

impl FlakySource {
    pub(crate) fn new(broken: Option<ClientId>) -> Self {
        Self {
            inner: SyntheticSource::new(1, shape()),
            broken,
            broken_mode: None,
            loads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_in(broken: ClientId, mode: PartitionMode) -> Self {
        Self {
            broken_mode: Some(mode),
            ..Self::new(Some(broken))
        }
    }
}

impl DataSource for FlakySource {
    async fn load(
        &self,
        client_id: ClientId,
        mode: PartitionMode,
    ) -> Result<RawPartition, DataError> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let broken_now = self.broken_mode.is_none_or(|broken_mode| broken_mode == mode);
        if self.broken == Some(client_id) && broken_now {
            return Err(DataError::Io(std::io::Error::other("unreachable partition")));
        }

        self.inner.load(client_id, mode).await
    }
}
