use log::{debug, info, warn};
use machine_learning::{Result as MlResult, training::EpochEnd};

use crate::{
    client::{ClientId, ClientSlot, ClientState, Hyperparameters, TrainingRun},
    configs::OptimizerConfig,
    data::Partition,
    error::{FederationError, Result},
    metrics::MetricsRecorder,
    model::{LocalModel, ModelFactory},
};

/// Runs the local training of a single client.
pub struct LocalTrainer<'a, F> {
    factory: &'a F,
    optimizer: OptimizerConfig,
    metrics: &'a MetricsRecorder,
}

impl<'a, F: ModelFactory> LocalTrainer<'a, F> {
    /// Creates a new `LocalTrainer`.
    ///
    /// # Arguments
    /// * `factory` - Builds the model of clients that have none yet.
    /// * `optimizer` - The optimizer every model is compiled with.
    /// * `metrics` - Where the per-epoch results are recorded.
    pub fn new(factory: &'a F, optimizer: OptimizerConfig, metrics: &'a MetricsRecorder) -> Self {
        Self {
            factory,
            optimizer,
            metrics,
        }
    }

    /// Trains a client's model on its own train split, validating on its own test split after
    /// every epoch.
    ///
    /// The client keeps its model between runs, so every run continues from the last one. A
    /// model built for a run that fails is dropped.
    ///
    /// # Arguments
    /// * `slot` - The client to train.
    ///
    /// # Returns
    /// The summary of the run, also appended to the client's history, or an error if the
    /// client is already training, has no data or the fit failed.
    pub async fn train(&self, slot: &ClientSlot<F::Model>) -> Result<TrainingRun> {
        let client_id = slot.id();
        let Some(_guard) = slot.start_training() else {
            return Err(FederationError::AlreadyTraining { client_id });
        };

        let hyperparameters = slot.hyperparameters();
        let mut state = slot.state().await;
        let ClientState {
            dataset,
            model: kept,
            history,
            accuracy,
        } = &mut *state;

        let Some(partition) = dataset.as_ref() else {
            return Err(FederationError::NoData { client_id });
        };

        let (mut model, built) = match kept.take() {
            Some(model) => (model, false),
            None => {
                let model = self
                    .factory
                    .build()
                    .map_err(|source| FederationError::TrainingFailure { client_id, source })?;
                (model, true)
            }
        };

        info!(
            client_id = client_id;
            "training started: learning_rate={} epochs={} batch_size={} new_model={built}",
            hyperparameters.learning_rate, hyperparameters.epochs, hyperparameters.batch_size
        );

        let result = self
            .fit(client_id, &mut model, partition, &hyperparameters, accuracy)
            .await;

        let epochs = match result {
            Ok(epochs) => epochs,
            Err(source) => {
                warn!(client_id = client_id; "training failed: {source}");
                if !built {
                    *kept = Some(model);
                }

                return Err(FederationError::TrainingFailure { client_id, source });
            }
        };

        *kept = Some(model);
        let run = TrainingRun {
            hyperparameters,
            epochs,
        };
        history.push(run.clone());

        info!(
            client_id = client_id;
            "training finished with accuracy {:?}", run.final_accuracy()
        );
        Ok(run)
    }

    /// Consumes the fit epoch by epoch, yielding to the scheduler in between.
    async fn fit(
        &self,
        client_id: ClientId,
        model: &mut F::Model,
        partition: &Partition,
        hyperparameters: &Hyperparameters,
        accuracy: &mut Option<f32>,
    ) -> MlResult<Vec<EpochEnd>> {
        model.compile(hyperparameters.learning_rate, self.optimizer)?;

        let fit = model.fit(
            &partition.train,
            &partition.test,
            hyperparameters.epochs,
            hyperparameters.batch_size,
        )?;

        let mut epochs = Vec::with_capacity(hyperparameters.epochs.get());
        for end in fit {
            let end = end?;
            *accuracy = Some(end.val_accuracy);
            self.metrics.record_epoch(client_id, &end);
            debug!(client_id = client_id, epoch = end.epoch; "epoch finished");

            epochs.push(end);
            tokio::task::yield_now().await;
        }

        Ok(epochs)
    }
}
