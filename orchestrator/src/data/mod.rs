mod data_source;
mod partition;
mod source;
mod synthetic;

pub use data_source::DataSource;
pub use partition::{DataShape, Partition, PartitionMode, RawPartition};
pub use source::{ConfiguredSource, JsonDirSource};
pub use synthetic::SyntheticSource;
