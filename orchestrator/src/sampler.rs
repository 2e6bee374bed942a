use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{client::ClientId, configs::validate_participation, error::Result};

/// The ordered subset of clients taking part in a round.
pub type ParticipationSet = Vec<ClientId>;

/// The probability of each client being included in an aggregation.
///
/// Historically labeled "dropout probability", although a client participates when its draw
/// falls *below* it, so `1.0` means everyone participates.
#[derive(Debug)]
pub struct DropoutControl(AtomicU32);

impl DropoutControl {
    pub fn new(participation: f32) -> Result<Self> {
        validate_participation(participation)?;
        Ok(Self(AtomicU32::new(participation.to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Sets a new probability, must be in `[0, 1]`.
    pub fn set(&self, participation: f32) -> Result<()> {
        validate_participation(participation)?;
        self.0.store(participation.to_bits(), Ordering::Release);
        Ok(())
    }
}

impl Default for DropoutControl {
    fn default() -> Self {
        Self(AtomicU32::new(1f32.to_bits()))
    }
}

/// Decides which clients take part in each round.
pub struct ParticipationSampler {
    rng: Mutex<StdRng>,
}

impl ParticipationSampler {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Creates a new `ParticipationSampler`, seeded from entropy if `seed` is `None`.
    pub fn seeded(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self::new(rng)
    }

    /// Draws `u` in `[0, 1)` once per client and keeps it iff `u < participation`.
    ///
    /// # Arguments
    /// * `ids` - Every candidate, the result keeps their order.
    /// * `participation` - The inclusion probability.
    pub fn sample(&self, ids: &[ClientId], participation: f32) -> ParticipationSet {
        let mut rng = self.rng.lock();

        ids.iter()
            .copied()
            .filter(|_| rng.random::<f32>() < participation)
            .collect()
    }
}
