use log::debug;
use ndarray::ArrayD;
use rayon::prelude::*;

use crate::{
    client::ClientId,
    error::{FederationError, Result},
    model::{LocalModel, ModelFactory},
};

/// The parameters of a participant, `None` if it has never been trained.
pub type Participant = (ClientId, Option<Vec<ArrayD<f32>>>);

/// The model produced by a round, replaced wholesale by the next one.
pub struct GlobalModel<M> {
    model: M,
    round: usize,
}

impl<M> GlobalModel<M> {
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The round this model was produced in.
    pub fn round(&self) -> usize {
        self.round
    }
}

/// Combines the parameters of the participants of a round.
#[derive(Debug, Default, Clone, Copy)]
pub struct AggregationEngine;

impl AggregationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Averages the participants' parameters, tensor by tensor, without weighting.
    ///
    /// # Arguments
    /// * `participants` - The id and parameters of every participant.
    ///
    /// # Returns
    /// The averaged tensors, or an error if there are no participants, one of them is
    /// untrained or their topologies differ.
    pub fn aggregate(&self, participants: &[Participant]) -> Result<Vec<ArrayD<f32>>> {
        let Some((_, first)) = participants.first() else {
            return Err(FederationError::NoParticipants);
        };

        let mut params = Vec::with_capacity(participants.len());
        for (client_id, weights) in participants {
            let weights = weights
                .as_ref()
                .ok_or(FederationError::Untrained { client_id: *client_id })?;
            params.push((*client_id, weights));
        }

        let reference = first.as_ref().ok_or(FederationError::NoParticipants)?;
        for &(client_id, weights) in &params {
            check_topology(client_id, reference, weights)?;
        }

        let k = params.len() as f32;
        debug!("averaging {} tensors over {} participants", reference.len(), params.len());

        let averaged = (0..reference.len())
            .into_par_iter()
            .map(|layer| {
                let mut sum = ArrayD::zeros(reference[layer].raw_dim());
                for (_, weights) in &params {
                    sum += &weights[layer];
                }

                sum / k
            })
            .collect();

        Ok(averaged)
    }

    /// Builds a fresh model holding `params`.
    ///
    /// # Arguments
    /// * `params` - The aggregated parameters.
    /// * `factory` - Builds the model.
    /// * `round` - The round the model is produced in.
    pub fn build_global<F: ModelFactory>(
        &self,
        params: &[ArrayD<f32>],
        factory: &F,
        round: usize,
    ) -> Result<GlobalModel<F::Model>> {
        let mut model = factory.build()?;
        model.set_weights(params)?;
        Ok(GlobalModel { model, round })
    }
}

fn check_topology(
    client_id: ClientId,
    reference: &[ArrayD<f32>],
    weights: &[ArrayD<f32>],
) -> Result<()> {
    if weights.len() != reference.len() {
        return Err(FederationError::TopologyMismatch {
            client_id,
            detail: format!("{} tensors, expected {}", weights.len(), reference.len()),
        });
    }

    for (layer, (got, expected)) in weights.iter().zip(reference).enumerate() {
        if got.shape() != expected.shape() {
            return Err(FederationError::TopologyMismatch {
                client_id,
                detail: format!(
                    "tensor {layer} has shape {:?}, expected {:?}",
                    got.shape(),
                    expected.shape()
                ),
            });
        }
    }

    Ok(())
}
