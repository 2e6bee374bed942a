use super::{PartitionMode, RawPartition};
use crate::{client::ClientId, error::DataError};

/// Provides the raw partition of every client.
#[allow(unused)]
#[trait_variant::make(DataSource: Send)]
pub trait LocalDataSource {
    /// Loads the partition of a client.
    ///
    /// # Arguments
    /// * `client_id` - The client whose partition to load.
    /// * `mode` - Which partitioning of the data to use.
    ///
    /// # Returns
    /// The raw partition or an error if it couldn't be read.
    async fn load(
        &self,
        client_id: ClientId,
        mode: PartitionMode,
    ) -> Result<RawPartition, DataError>;
}
