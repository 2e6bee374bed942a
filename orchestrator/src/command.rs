use serde::{Deserialize, Serialize};

use crate::{
    client::{ClientId, Hyperparameter, TrainingRun},
    data::PartitionMode,
    round::{RoundOutcome, RoundReport, TrainingReport},
};

/// Which clients a round trains before aggregating.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    All,
    Clients(Vec<ClientId>),
    /// Aggregates whatever the clients already learnt.
    None,
}

/// A request to the orchestrator, one per user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    SelectMode(PartitionMode),
    SetHyperparameter {
        client_id: ClientId,
        value: Hyperparameter,
    },
    SetParticipation(f32),
    Train(ClientId),
    TrainAll,
    Aggregate,
    RunRound(Selection),
}

/// What a successful command did.
#[derive(Debug)]
pub enum CommandOutcome {
    ModeSelected(PartitionMode),
    HyperparameterSet { client_id: ClientId },
    ParticipationSet(f32),
    Trained {
        client_id: ClientId,
        run: TrainingRun,
    },
    TrainedAll(TrainingReport),
    Aggregated(RoundOutcome),
    Round(RoundReport),
}
