use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicBool, Ordering},
};

use machine_learning::training::EpochEnd;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    data::Partition,
    error::{FederationError, Result},
    guard::FlagGuard,
};

/// Clients are numbered from 1.
pub type ClientId = usize;

const DEFAULT_EPOCHS: NonZeroUsize = NonZeroUsize::MIN.saturating_add(4);
const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(31);

/// The knobs of a client's local training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub learning_rate: f32,
    pub epochs: NonZeroUsize,
    pub batch_size: NonZeroUsize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<()> {
        validate_learning_rate(self.learning_rate)
    }

    /// Applies a single change, leaving `self` untouched if the value is invalid.
    pub fn apply(&mut self, value: Hyperparameter) -> Result<()> {
        match value {
            Hyperparameter::LearningRate(lr) => {
                validate_learning_rate(lr)?;
                self.learning_rate = lr;
            }
            Hyperparameter::Epochs(epochs) => self.epochs = non_zero("epochs", epochs)?,
            Hyperparameter::BatchSize(size) => self.batch_size = non_zero("batch_size", size)?,
        }

        Ok(())
    }
}

/// A change to one of a client's hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hyperparameter {
    LearningRate(f32),
    Epochs(usize),
    BatchSize(usize),
}

fn validate_learning_rate(lr: f32) -> Result<()> {
    if !lr.is_finite() || lr <= 0. {
        return Err(FederationError::InvalidConfig(format!(
            "learning_rate must be positive and finite, got {lr}"
        )));
    }

    Ok(())
}

fn non_zero(name: &str, value: usize) -> Result<NonZeroUsize> {
    NonZeroUsize::new(value)
        .ok_or_else(|| FederationError::InvalidConfig(format!("{name} must be at least 1")))
}

/// The summary of one finished local training.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRun {
    /// The hyperparameters in effect when the run started.
    pub hyperparameters: Hyperparameters,
    pub epochs: Vec<EpochEnd>,
}

impl TrainingRun {
    /// The validation accuracy after the last epoch.
    pub fn final_accuracy(&self) -> Option<f32> {
        self.epochs.last().map(|epoch| epoch.val_accuracy)
    }
}

/// What a client owns, guarded by its lock.
pub struct ClientState<M> {
    pub(crate) dataset: Option<Partition>,
    pub(crate) model: Option<M>,
    pub(crate) history: Vec<TrainingRun>,
    pub(crate) accuracy: Option<f32>,
}

impl<M> Default for ClientState<M> {
    fn default() -> Self {
        Self {
            dataset: None,
            model: None,
            history: Vec::new(),
            accuracy: None,
        }
    }
}

impl<M> ClientState<M> {
    pub fn dataset(&self) -> Option<&Partition> {
        self.dataset.as_ref()
    }

    pub fn model(&self) -> Option<&M> {
        self.model.as_ref()
    }

    pub fn history(&self) -> &[TrainingRun] {
        &self.history
    }

    /// The validation accuracy of the last epoch trained.
    pub fn accuracy(&self) -> Option<f32> {
        self.accuracy
    }

    /// Replaces the dataset and forgets everything learnt from the previous one.
    pub(crate) fn reset(&mut self, dataset: Partition) {
        self.dataset = Some(dataset);
        self.model = None;
        self.history.clear();
        self.accuracy = None;
    }
}

/// A simulated client.
///
/// The training flag and the hyperparameters live outside the state lock so they can be read
/// and changed while a training holds it.
pub struct ClientSlot<M> {
    id: ClientId,
    training: AtomicBool,
    hyperparameters: Mutex<Hyperparameters>,
    state: AsyncMutex<ClientState<M>>,
}

impl<M> ClientSlot<M> {
    pub fn new(id: ClientId, hyperparameters: Hyperparameters) -> Self {
        Self {
            id,
            training: AtomicBool::new(false),
            hyperparameters: Mutex::new(hyperparameters),
            state: AsyncMutex::new(ClientState::default()),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Acquire)
    }

    /// A copy of the current hyperparameters.
    pub fn hyperparameters(&self) -> Hyperparameters {
        *self.hyperparameters.lock()
    }

    pub fn set_hyperparameter(&self, value: Hyperparameter) -> Result<()> {
        self.hyperparameters.lock().apply(value)
    }

    /// Locks the client's state, waiting for a running training to finish.
    pub async fn state(&self) -> tokio::sync::MutexGuard<'_, ClientState<M>> {
        self.state.lock().await
    }

    /// Marks the client as training.
    ///
    /// # Returns
    /// A guard that clears the mark when dropped, or `None` if the client was already training.
    pub(crate) fn start_training(&self) -> Option<FlagGuard<'_>> {
        FlagGuard::try_acquire(&self.training)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_flag_is_exclusive_and_released_on_drop() {
        let slot: ClientSlot<()> = ClientSlot::new(1, Hyperparameters::default());

        let guard = slot.start_training().unwrap();
        assert!(slot.is_training());
        assert!(slot.start_training().is_none());

        drop(guard);
        assert!(!slot.is_training());
        assert!(slot.start_training().is_some());
    }

    #[test]
    fn invalid_hyperparameters_are_rejected_without_change() {
        let slot: ClientSlot<()> = ClientSlot::new(1, Hyperparameters::default());

        assert!(slot.set_hyperparameter(Hyperparameter::LearningRate(-0.1)).is_err());
        assert!(slot.set_hyperparameter(Hyperparameter::Epochs(0)).is_err());
        assert_eq!(slot.hyperparameters(), Hyperparameters::default());

        slot.set_hyperparameter(Hyperparameter::BatchSize(8)).unwrap();
        assert_eq!(slot.hyperparameters().batch_size.get(), 8);
    }

    #[test]
    fn default_hyperparameters() {
        let hp = Hyperparameters::default();
        assert_eq!(hp.learning_rate, 0.01);
        assert_eq!(hp.epochs.get(), 5);
        assert_eq!(hp.batch_size.get(), 32);
    }
}
