use std::{error::Error, fmt, io};

use machine_learning::MlErr;

use crate::client::ClientId;

/// The result type used across the orchestrator.
pub type Result<T> = std::result::Result<T, FederationError>;

/// Everything that can go wrong while reading a client's partition.
#[derive(Debug)]
pub enum DataError {
    /// The partition couldn't be read.
    Io(io::Error),
    /// The partition isn't valid JSON or misses a field.
    Json(serde_json::Error),
    /// A split has the wrong amount of rows or columns.
    Shape {
        field: &'static str,
        got: usize,
        expected: usize,
    },
    /// A label is outside `0..classes`.
    Label {
        field: &'static str,
        index: usize,
        value: i64,
        classes: usize,
    },
}

impl DataError {
    /// Whether the data was read but doesn't have the expected shape.
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape { .. } | Self::Label { .. })
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "malformed partition: {e}"),
            Self::Shape {
                field,
                got,
                expected,
            } => write!(f, "{field} has {got} entries, expected {expected}"),
            Self::Label {
                field,
                index,
                value,
                classes,
            } => write!(
                f,
                "{field}[{index}] is {value}, expected a label in 0..{classes}"
            ),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DataError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for DataError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// All errors that can occur while orchestrating the federation.
#[derive(Debug)]
pub enum FederationError {
    /// There's no client with this id.
    NotFound { client_id: ClientId },
    /// The client has no dataset loaded yet.
    NoData { client_id: ClientId },
    /// The client is already running a training, nothing was done.
    AlreadyTraining { client_id: ClientId },
    /// The client's partition couldn't be loaded.
    DataLoadFailure {
        client_id: ClientId,
        source: DataError,
    },
    /// The client's partition was loaded but has the wrong shape.
    InvalidDataShape {
        client_id: ClientId,
        source: DataError,
    },
    /// The model library failed while fitting the client's model.
    TrainingFailure { client_id: ClientId, source: MlErr },
    /// Sampling left no client to aggregate.
    NoParticipants,
    /// A participant was sampled but has never been trained.
    Untrained { client_id: ClientId },
    /// A participant's parameters don't line up with the rest.
    TopologyMismatch { client_id: ClientId, detail: String },
    /// There's no global model or no global test set yet.
    NotInitialized,
    /// Another mode switch, aggregation or round is in progress.
    Busy,
    /// The model library failed outside of a client's training.
    Model(MlErr),
    /// Invalid configuration, caught before building anything.
    InvalidConfig(String),
    Io(io::Error),
}

impl FederationError {
    /// Every error aborts the operation that raised it except a training request for a client
    /// that is already training, which is simply ignored.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AlreadyTraining { .. })
    }

    /// The client the error is about, if any.
    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            Self::NotFound { client_id }
            | Self::NoData { client_id }
            | Self::AlreadyTraining { client_id }
            | Self::DataLoadFailure { client_id, .. }
            | Self::InvalidDataShape { client_id, .. }
            | Self::TrainingFailure { client_id, .. }
            | Self::Untrained { client_id }
            | Self::TopologyMismatch { client_id, .. } => Some(*client_id),
            _ => None,
        }
    }

    /// Classifies a failed partition load.
    pub(crate) fn from_data(client_id: ClientId, source: DataError) -> Self {
        if source.is_shape() {
            Self::InvalidDataShape { client_id, source }
        } else {
            Self::DataLoadFailure { client_id, source }
        }
    }
}

impl fmt::Display for FederationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { client_id } => write!(f, "client {client_id} does not exist"),
            Self::NoData { client_id } => write!(f, "no data available for client {client_id}"),
            Self::AlreadyTraining { client_id } => {
                write!(f, "client {client_id} is already training")
            }
            Self::DataLoadFailure { client_id, source } => {
                write!(f, "failed to load data for client {client_id}: {source}")
            }
            Self::InvalidDataShape { client_id, source } => {
                write!(f, "invalid data for client {client_id}: {source}")
            }
            Self::TrainingFailure { client_id, source } => {
                write!(f, "training failed for client {client_id}: {source}")
            }
            Self::NoParticipants => f.write_str("no clients participating due to dropout"),
            Self::Untrained { client_id } => {
                write!(f, "client {client_id} participates but has no trained model")
            }
            Self::TopologyMismatch { client_id, detail } => {
                write!(f, "client {client_id} has a different model topology: {detail}")
            }
            Self::NotInitialized => f.write_str("global model or test set not initialized"),
            Self::Busy => f.write_str("another mode switch, aggregation or round is in progress"),
            Self::Model(e) => write!(f, "model error: {e}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for FederationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DataLoadFailure { source, .. } | Self::InvalidDataShape { source, .. } => {
                Some(source)
            }
            Self::TrainingFailure { source, .. } => Some(source),
            Self::Model(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FederationError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MlErr> for FederationError {
    fn from(e: MlErr) -> Self {
        Self::Model(e)
    }
}
