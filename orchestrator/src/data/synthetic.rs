use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{DataSource, DataShape, PartitionMode, RawPartition};
use crate::{client::ClientId, error::DataError};

const NOISE: f32 = 48.;

/// Generates partitions in memory, shaped like the real ones.
///
/// Every class has a fixed random prototype image and samples are noisy copies of it. The same
/// seed, client and mode always yield the same partition. In `non-iid` mode client `i` only
/// gets labels `2(i - 1)` and `2(i - 1) + 1`, wrapped around the amount of classes.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
    shape: DataShape,
    prototypes: Vec<Vec<f32>>,
}

impl SyntheticSource {
    pub fn new(seed: u64, shape: DataShape) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let prototypes = (0..shape.classes)
            .map(|_| {
                (0..shape.features)
                    .map(|_| rng.random_range(0f32..=255.))
                    .collect()
            })
            .collect();

        Self {
            seed,
            shape,
            prototypes,
        }
    }

    /// The labels a client may get in the given mode.
    pub fn labels(&self, client_id: ClientId, mode: PartitionMode) -> Vec<i64> {
        let classes = self.shape.classes.max(1);

        match mode {
            PartitionMode::Iid => (0..classes as i64).collect(),
            PartitionMode::NonIid => {
                let first = 2 * client_id.saturating_sub(1);
                vec![(first % classes) as i64, ((first + 1) % classes) as i64]
            }
        }
    }

    fn generate(&self, client_id: ClientId, mode: PartitionMode) -> RawPartition {
        let stream = match mode {
            PartitionMode::Iid => 0,
            PartitionMode::NonIid => 1,
        };

        let seed = self
            .seed
            .wrapping_add(((client_id as u64) << 1) | stream)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = StdRng::seed_from_u64(seed);
        let labels = self.labels(client_id, mode);

        let (x_train, y_train) = self.samples(self.shape.train_len, &labels, &mut rng);
        let (x_test, y_test) = self.samples(self.shape.test_len, &labels, &mut rng);

        RawPartition {
            x_train,
            y_train,
            x_test,
            y_test,
        }
    }

    fn samples(&self, n: usize, labels: &[i64], rng: &mut StdRng) -> (Vec<Vec<f32>>, Vec<i64>) {
        let mut xs = Vec::with_capacity(n);
        let mut ys = Vec::with_capacity(n);

        for _ in 0..n {
            let label = labels[rng.random_range(0..labels.len())];
            let x = self.prototypes[label as usize]
                .iter()
                .map(|&px| (px + rng.random_range(-NOISE..=NOISE)).clamp(0., 255.))
                .collect();

            xs.push(x);
            ys.push(label);
        }

        (xs, ys)
    }
}

impl DataSource for SyntheticSource {
    async fn load(
        &self,
        client_id: ClientId,
        mode: PartitionMode,
    ) -> Result<RawPartition, DataError> {
        Ok(self.generate(client_id, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> DataShape {
        DataShape {
            train_len: 20,
            test_len: 5,
            features: 6,
            classes: 10,
        }
    }

    #[tokio::test]
    async fn partitions_have_the_configured_shape() {
        let source = SyntheticSource::new(1, shape());
        let raw = source.load(2, PartitionMode::Iid).await.unwrap();
        let partition = raw.into_partition(&shape()).unwrap();

        assert_eq!(partition.train.len(), 20);
        assert_eq!(partition.test.len(), 5);
        assert_eq!(partition.train.features(), 6);
    }

    #[tokio::test]
    async fn same_seed_same_partition() {
        let a = SyntheticSource::new(7, shape());
        let b = SyntheticSource::new(7, shape());

        assert_eq!(
            a.load(1, PartitionMode::NonIid).await.unwrap(),
            b.load(1, PartitionMode::NonIid).await.unwrap()
        );
        assert_ne!(
            a.load(1, PartitionMode::Iid).await.unwrap(),
            a.load(2, PartitionMode::Iid).await.unwrap()
        );
    }

    #[tokio::test]
    async fn non_iid_clients_get_two_labels() {
        let source = SyntheticSource::new(3, shape());
        let raw = source.load(3, PartitionMode::NonIid).await.unwrap();

        assert!(raw.y_train.iter().chain(&raw.y_test).all(|&y| y == 4 || y == 5));
        assert_eq!(source.labels(6, PartitionMode::NonIid), vec![0, 1]);
    }
}
