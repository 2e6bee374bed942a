use std::sync::{Arc, atomic::AtomicBool};

use log::{debug, error, info, warn};
use machine_learning::dataset::Dataset;
use parking_lot::{Mutex, RwLock};

use crate::{
    aggregation::{AggregationEngine, GlobalModel, Participant},
    client::{ClientId, Hyperparameter, TrainingRun},
    command::{Command, CommandOutcome, Selection},
    configs::{FederationConfig, OptimizerConfig},
    data::{ConfiguredSource, DataShape, DataSource, PartitionMode},
    error::{FederationError, Result},
    evaluation::EvaluationService,
    guard::FlagGuard,
    metrics::{MetricsRecorder, MetricsSink, RoundRecord},
    model::{LocalModel, ModelFactory, NetworkFactory},
    registry::ClientRegistry,
    sampler::{DropoutControl, ParticipationSampler, ParticipationSet},
    trainer::LocalTrainer,
};

/// The outcome of training several clients, one after the other.
#[derive(Debug, Default)]
pub struct TrainingReport {
    pub runs: Vec<(ClientId, TrainingRun)>,
    /// Clients that were already training.
    pub skipped: Vec<ClientId>,
    /// Clients whose training failed, the rest were trained anyway.
    pub failures: Vec<FederationError>,
}

impl TrainingReport {
    pub fn trained(&self) -> Vec<ClientId> {
        self.runs.iter().map(|(client_id, _)| *client_id).collect()
    }
}

/// The outcome of an aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub record: RoundRecord,
    pub participants: ParticipationSet,
}

/// The outcome of a full round.
#[derive(Debug)]
pub struct RoundReport {
    pub training: TrainingReport,
    pub outcome: RoundOutcome,
}

/// Drives the federation: loads the partitions, trains the clients, aggregates them into the
/// global model and scores it.
///
/// Every operation takes `&self`, so the orchestrator can be shared between tasks. Mode switches,
/// aggregations and rounds exclude each other, a second one fails with `Busy` instead of
/// waiting.
pub struct RoundOrchestrator<S, F: ModelFactory> {
    registry: ClientRegistry<F::Model>,
    source: S,
    factory: F,
    optimizer: OptimizerConfig,
    shape: DataShape,
    initial_mode: PartitionMode,

    sampler: ParticipationSampler,
    dropout: DropoutControl,
    engine: AggregationEngine,
    evaluation: EvaluationService,
    metrics: MetricsRecorder,

    mode: Mutex<Option<PartitionMode>>,
    global_model: RwLock<Option<Arc<GlobalModel<F::Model>>>>,
    test_set: RwLock<Option<Arc<Dataset>>>,
    busy: AtomicBool,
}

impl RoundOrchestrator<ConfiguredSource, NetworkFactory> {
    /// Creates a new `RoundOrchestrator` with the data source and model the config describes.
    pub fn from_config(config: &FederationConfig, sink: Box<dyn MetricsSink>) -> Result<Self> {
        let source = ConfiguredSource::new(&config.data, config.shape);
        let factory = NetworkFactory::from_config(config);
        Self::new(config, source, factory, sink)
    }
}

impl<S, F> RoundOrchestrator<S, F>
where
    S: DataSource + Sync,
    F: ModelFactory,
{
    /// Creates a new `RoundOrchestrator`, its clients have no data until a mode is selected.
    ///
    /// # Arguments
    /// * `config` - The federation's configuration, validated here.
    /// * `source` - Where the client partitions come from.
    /// * `factory` - Builds the local and global models.
    /// * `sink` - Observes the recorded metrics.
    pub fn new(
        config: &FederationConfig,
        source: S,
        factory: F,
        sink: Box<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            registry: ClientRegistry::new(config.clients, config.hyperparameters)?,
            source,
            factory,
            optimizer: config.optimizer,
            shape: config.shape,
            initial_mode: config.mode,
            sampler: ParticipationSampler::seeded(config.seed),
            dropout: DropoutControl::new(config.participation)?,
            engine: AggregationEngine::new(),
            evaluation: EvaluationService::new(),
            metrics: MetricsRecorder::new(sink),
            mode: Mutex::new(None),
            global_model: RwLock::new(None),
            test_set: RwLock::new(None),
            busy: AtomicBool::new(false),
        })
    }

    /// Loads the configured partition mode.
    pub async fn initialize(&self) -> Result<()> {
        self.select_mode(self.initial_mode).await
    }

    /// Loads every client's partition for `mode` and rebuilds the global test set.
    ///
    /// Clients lose their models, histories and accuracies, the metrics are cleared and the
    /// global model is dropped. Nothing changes if any partition fails to load, and nothing is
    /// done if `mode` is already loaded.
    pub async fn select_mode(&self, mode: PartitionMode) -> Result<()> {
        let _busy = self.enter()?;

        let current = *self.mode.lock();
        if current == Some(mode) {
            debug!("{mode} partitions already loaded");
            return Ok(());
        }

        info!("loading {mode} partitions for {} clients", self.registry.len());

        let mut loaded = Vec::with_capacity(self.registry.len());
        for client_id in self.registry.ids() {
            let partition = self
                .source
                .load(client_id, mode)
                .await
                .and_then(|raw| raw.into_partition(&self.shape));

            if let Err(e) = &partition {
                warn!(client_id = client_id; "failed to load {mode} partition: {e}");
            }

            loaded.push(partition);
        }

        let test_set = {
            let tests: Vec<&Dataset> = loaded
                .iter()
                .filter_map(|partition| partition.as_ref().ok())
                .map(|partition| &partition.test)
                .collect();

            if tests.len() == loaded.len() {
                Some(Dataset::concat(&tests)?)
            } else {
                None
            }
        };

        if let Err(e) = self.registry.reset_all(loaded).await {
            error!("switch to {mode} aborted: {e}");
            return Err(e);
        }

        self.metrics.reset_all();
        *self.global_model.write() = None;
        *self.test_set.write() = test_set.map(Arc::new);
        *self.mode.lock() = Some(mode);

        info!("{mode} partitions loaded");
        Ok(())
    }

    pub fn set_hyperparameter(&self, client_id: ClientId, value: Hyperparameter) -> Result<()> {
        self.registry.get(client_id)?.set_hyperparameter(value)?;
        info!(client_id = client_id; "hyperparameter set: {value:?}");
        Ok(())
    }

    /// Sets the probability of every client being included in the next aggregations.
    pub fn set_participation(&self, participation: f32) -> Result<()> {
        self.dropout.set(participation)?;
        info!("participation set to {participation}");
        Ok(())
    }

    /// Trains a single client.
    ///
    /// # Returns
    /// The summary of the run, or an error that's also logged. `AlreadyTraining` means the
    /// request was ignored.
    pub async fn train(&self, client_id: ClientId) -> Result<TrainingRun> {
        let slot = self.registry.get(client_id)?;
        let result = self.trainer().train(slot).await;

        match &result {
            Err(e) if e.is_fatal() => warn!(client_id = client_id; "{e}"),
            Err(e) => info!(client_id = client_id; "{e}, request ignored"),
            Ok(_) => {}
        }

        result
    }

    /// Trains every client in order, skipping those already training.
    pub async fn train_all(&self) -> TrainingReport {
        self.train_clients(&self.registry.ids()).await
    }

    /// Samples the participants, averages their parameters into a new global model and scores
    /// it, without training anyone.
    pub async fn aggregate(&self) -> Result<RoundOutcome> {
        let _busy = self.enter()?;
        self.aggregate_round().await
    }

    /// Trains the selected clients and aggregates.
    ///
    /// Training failures don't stop the round, they're collected in the report. Failing to
    /// aggregate does, leaving the global model as it was.
    pub async fn run_round(&self, selection: Selection) -> Result<RoundReport> {
        let _busy = self.enter()?;

        let ids = match selection {
            Selection::All => self.registry.ids(),
            Selection::Clients(ids) => {
                for &client_id in &ids {
                    self.registry.get(client_id)?;
                }
                ids
            }
            Selection::None => Vec::new(),
        };

        info!(round = self.metrics.next_round(); "round started, training {} clients", ids.len());

        let training = self.train_clients(&ids).await;
        let outcome = self.aggregate_round().await?;

        Ok(RoundReport { training, outcome })
    }

    /// Executes a command.
    pub async fn dispatch(&self, command: Command) -> Result<CommandOutcome> {
        let outcome = match command {
            Command::SelectMode(mode) => {
                self.select_mode(mode).await?;
                CommandOutcome::ModeSelected(mode)
            }
            Command::SetHyperparameter { client_id, value } => {
                self.set_hyperparameter(client_id, value)?;
                CommandOutcome::HyperparameterSet { client_id }
            }
            Command::SetParticipation(participation) => {
                self.set_participation(participation)?;
                CommandOutcome::ParticipationSet(participation)
            }
            Command::Train(client_id) => {
                let run = self.train(client_id).await?;
                CommandOutcome::Trained { client_id, run }
            }
            Command::TrainAll => CommandOutcome::TrainedAll(self.train_all().await),
            Command::Aggregate => CommandOutcome::Aggregated(self.aggregate().await?),
            Command::RunRound(selection) => CommandOutcome::Round(self.run_round(selection).await?),
        };

        Ok(outcome)
    }

    /// Scores the current global model against the global test set.
    pub fn evaluate_global(&self) -> Result<f32> {
        let global = self.global_model();
        let test_set = self.global_test_set();
        self.evaluation.evaluate(global.as_deref(), test_set.as_deref())
    }

    pub fn registry(&self) -> &ClientRegistry<F::Model> {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// The accuracy of every round since the last mode switch.
    pub fn accuracy_history(&self) -> Vec<RoundRecord> {
        self.metrics.rounds()
    }

    /// The loaded partition mode, if any.
    pub fn mode(&self) -> Option<PartitionMode> {
        *self.mode.lock()
    }

    pub fn participation(&self) -> f32 {
        self.dropout.get()
    }

    pub fn global_model(&self) -> Option<Arc<GlobalModel<F::Model>>> {
        self.global_model.read().clone()
    }

    pub fn global_test_set(&self) -> Option<Arc<Dataset>> {
        self.test_set.read().clone()
    }

    fn enter(&self) -> Result<FlagGuard<'_>> {
        FlagGuard::try_acquire(&self.busy).ok_or(FederationError::Busy)
    }

    fn trainer(&self) -> LocalTrainer<'_, F> {
        LocalTrainer::new(&self.factory, self.optimizer, &self.metrics)
    }

    async fn train_clients(&self, ids: &[ClientId]) -> TrainingReport {
        let trainer = self.trainer();
        let mut report = TrainingReport::default();

        for &client_id in ids {
            let slot = match self.registry.get(client_id) {
                Ok(slot) => slot,
                Err(e) => {
                    report.failures.push(e);
                    continue;
                }
            };

            if slot.is_training() {
                debug!(client_id = client_id; "already training, skipped");
                report.skipped.push(client_id);
                continue;
            }

            match trainer.train(slot).await {
                Ok(run) => report.runs.push((client_id, run)),
                Err(FederationError::AlreadyTraining { .. }) => report.skipped.push(client_id),
                Err(e) => {
                    warn!(client_id = client_id; "{e}");
                    report.failures.push(e);
                }
            }
        }

        report
    }

    async fn aggregate_round(&self) -> Result<RoundOutcome> {
        let participation = self.dropout.get();
        let participants = self.sampler.sample(&self.registry.ids(), participation);

        if participants.is_empty() {
            error!("no clients participating with participation {participation}");
            return Err(FederationError::NoParticipants);
        }

        info!("aggregating clients {participants:?}");

        let mut params: Vec<Participant> = Vec::with_capacity(participants.len());
        for &client_id in &participants {
            let state = self.registry.get(client_id)?.state().await;
            let weights = state.model().map(|model| model.weights()).transpose()?;
            params.push((client_id, weights));
        }

        match self.install_global(&params) {
            Ok(record) => Ok(RoundOutcome {
                record,
                participants,
            }),
            Err(e) => {
                error!("round aborted: {e}");
                Err(e)
            }
        }
    }

    /// Averages `params`, scores the result and, only if that succeeds, makes it the global
    /// model.
    fn install_global(&self, params: &[Participant]) -> Result<RoundRecord> {
        let averaged = self.engine.aggregate(params)?;
        let global = self
            .engine
            .build_global(&averaged, &self.factory, self.metrics.next_round())?;

        let test_set = self.global_test_set();
        let accuracy = self.evaluation.evaluate(Some(&global), test_set.as_deref())?;

        let record = self.metrics.record_round(accuracy);
        *self.global_model.write() = Some(Arc::new(global));
        Ok(record)
    }
}
