use std::path::PathBuf;

use log::debug;

use super::{DataSource, PartitionMode, RawPartition, SyntheticSource};
use crate::{client::ClientId, configs::DataConfig, data::DataShape, error::DataError};

/// Reads partitions from `<root>/<mode>/client<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
}

impl JsonDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, client_id: ClientId, mode: PartitionMode) -> PathBuf {
        self.root
            .join(mode.as_str())
            .join(format!("client{client_id}.json"))
    }
}

impl DataSource for JsonDirSource {
    async fn load(
        &self,
        client_id: ClientId,
        mode: PartitionMode,
    ) -> Result<RawPartition, DataError> {
        let path = self.path(client_id, mode);
        debug!(client_id = client_id; "reading {}", path.display());

        let bytes = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// The data source selected by the configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredSource {
    JsonDir(JsonDirSource),
    Synthetic(SyntheticSource),
}

impl ConfiguredSource {
    pub fn new(config: &DataConfig, shape: DataShape) -> Self {
        match config {
            DataConfig::JsonDir { root } => Self::JsonDir(JsonDirSource::new(root)),
            DataConfig::Synthetic { seed } => Self::Synthetic(SyntheticSource::new(*seed, shape)),
        }
    }
}

impl DataSource for ConfiguredSource {
    async fn load(
        &self,
        client_id: ClientId,
        mode: PartitionMode,
    ) -> Result<RawPartition, DataError> {
        match self {
            Self::JsonDir(source) => source.load(client_id, mode).await,
            Self::Synthetic(source) => source.load(client_id, mode).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{env, fs, process};

    use super::*;

    #[test]
    fn paths_follow_the_splitter_layout() {
        let source = JsonDirSource::new("data");
        assert_eq!(
            source.path(3, PartitionMode::NonIid),
            PathBuf::from("data/non-iid/client3.json")
        );
    }

    #[tokio::test]
    async fn reads_a_partition_file() {
        let root = env::temp_dir().join(format!("fed-json-source-{}", process::id()));
        fs::create_dir_all(root.join("iid")).unwrap();

        let raw = RawPartition {
            x_train: vec![vec![1., 2.]],
            y_train: vec![1],
            x_test: vec![vec![3., 4.]],
            y_test: vec![0],
        };
        fs::write(root.join("iid/client1.json"), serde_json::to_vec(&raw).unwrap()).unwrap();

        let source = JsonDirSource::new(&root);
        assert_eq!(source.load(1, PartitionMode::Iid).await.unwrap(), raw);
        assert!(matches!(
            source.load(2, PartitionMode::Iid).await,
            Err(DataError::Io(_))
        ));

        fs::remove_dir_all(root).unwrap();
    }

    #[tokio::test]
    async fn malformed_files_are_json_errors() {
        let root = env::temp_dir().join(format!("fed-json-malformed-{}", process::id()));
        fs::create_dir_all(root.join("non-iid")).unwrap();
        fs::write(root.join("non-iid/client1.json"), b"{\"x_train\": []}").unwrap();

        let source = JsonDirSource::new(&root);
        assert!(matches!(
            source.load(1, PartitionMode::NonIid).await,
            Err(DataError::Json(_))
        ));

        fs::remove_dir_all(root).unwrap();
    }
}
