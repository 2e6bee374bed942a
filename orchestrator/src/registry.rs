use log::info;

use crate::{
    client::{ClientId, ClientSlot, Hyperparameters},
    data::Partition,
    error::{DataError, FederationError, Result},
};

/// Owns the fixed set of clients, numbered `1..=len`.
pub struct ClientRegistry<M> {
    clients: Vec<ClientSlot<M>>,
}

impl<M> ClientRegistry<M> {
    /// Creates a new `ClientRegistry` of clients without data.
    ///
    /// # Arguments
    /// * `len` - The amount of clients.
    /// * `hyperparameters` - The initial hyperparameters of every client.
    pub fn new(len: usize, hyperparameters: Hyperparameters) -> Result<Self> {
        if len == 0 {
            return Err(FederationError::InvalidConfig(
                "at least one client is required".into(),
            ));
        }

        let clients = (1..=len)
            .map(|id| ClientSlot::new(id, hyperparameters))
            .collect();

        Ok(Self { clients })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, client_id: ClientId) -> Result<&ClientSlot<M>> {
        client_id
            .checked_sub(1)
            .and_then(|i| self.clients.get(i))
            .ok_or(FederationError::NotFound { client_id })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientSlot<M>> {
        self.clients.iter()
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(ClientSlot::id).collect()
    }

    /// Replaces the dataset of every client, resetting its model, history and accuracy.
    ///
    /// # Arguments
    /// * `loaded` - The outcome of loading every client's partition, in id order.
    ///
    /// # Returns
    /// The error of the first client that failed to load, in which case no client is modified.
    pub async fn reset_all(
        &self,
        loaded: Vec<std::result::Result<Partition, DataError>>,
    ) -> Result<()> {
        if loaded.len() != self.clients.len() {
            return Err(FederationError::InvalidConfig(format!(
                "got {} partitions for {} clients",
                loaded.len(),
                self.clients.len()
            )));
        }

        let mut partitions = Vec::with_capacity(loaded.len());
        for (slot, result) in self.clients.iter().zip(loaded) {
            partitions.push(result.map_err(|e| FederationError::from_data(slot.id(), e))?);
        }

        // Every lock is taken before touching anything so the swap is all or nothing.
        let mut states = Vec::with_capacity(self.clients.len());
        for slot in &self.clients {
            states.push(slot.state().await);
        }

        for (state, partition) in states.iter_mut().zip(partitions) {
            state.reset(partition);
        }

        info!("reset {} clients", self.clients.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::dataset::Dataset;
    use ndarray::Array2;

    use super::*;
    use crate::client::TrainingRun;

    fn partition(value: f32) -> Partition {
        let data = Dataset::from_labels(Array2::from_elem((1, 2), value), &[0], 2).unwrap();
        Partition {
            train: data.clone(),
            test: data,
        }
    }

    #[test]
    fn ids_start_at_one() {
        let registry: ClientRegistry<()> =
            ClientRegistry::new(5, Hyperparameters::default()).unwrap();
        assert_eq!(registry.ids(), vec![1, 2, 3, 4, 5]);
        assert_eq!(registry.get(5).unwrap().id(), 5);
        assert!(matches!(
            registry.get(0),
            Err(FederationError::NotFound { client_id: 0 })
        ));
        assert!(matches!(
            registry.get(6),
            Err(FederationError::NotFound { client_id: 6 })
        ));
    }

    #[tokio::test]
    async fn reset_all_replaces_every_client() {
        let registry: ClientRegistry<u8> =
            ClientRegistry::new(2, Hyperparameters::default()).unwrap();
        {
            let mut state = registry.get(1).unwrap().state().await;
            state.model = Some(7);
            state.accuracy = Some(0.5);
            state.history.push(TrainingRun {
                hyperparameters: Hyperparameters::default(),
                epochs: Vec::new(),
            });
        }

        registry
            .reset_all(vec![Ok(partition(1.)), Ok(partition(2.))])
            .await
            .unwrap();

        let state = registry.get(1).unwrap().state().await;
        assert!(state.model().is_none());
        assert!(state.history().is_empty());
        assert_eq!(state.accuracy(), None);
        assert_eq!(state.dataset(), Some(&partition(1.)));
    }

    #[tokio::test]
    async fn reset_all_is_all_or_nothing() {
        let registry: ClientRegistry<u8> =
            ClientRegistry::new(5, Hyperparameters::default()).unwrap();
        registry
            .reset_all((1..=5).map(|i| Ok(partition(i as f32))).collect())
            .await
            .unwrap();
        registry.get(2).unwrap().state().await.model = Some(1);

        let loaded = (1..=5)
            .map(|i| {
                if i == 3 {
                    Err(DataError::Shape {
                        field: "x_train",
                        got: 10,
                        expected: 1000,
                    })
                } else {
                    Ok(partition(10. * i as f32))
                }
            })
            .collect();

        assert!(matches!(
            registry.reset_all(loaded).await,
            Err(FederationError::InvalidDataShape { client_id: 3, .. })
        ));

        for id in [1, 2, 4, 5] {
            let state = registry.get(id).unwrap().state().await;
            assert_eq!(state.dataset(), Some(&partition(id as f32)));
        }
        assert_eq!(registry.get(2).unwrap().state().await.model(), Some(&1));
    }
}
