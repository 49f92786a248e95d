//! Random pose choice after each trainer line.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks a pose uniformly from the trainer's pose names.
#[derive(Debug, Clone)]
pub struct PoseSelector {
    rng: StdRng,
}

impl PoseSelector {
    /// Seeded selector; the same seed always yields the same choices.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn new(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// One of `names`, or `None` if there are none.
    pub fn choose<'a>(&mut self, names: &[&'a str]) -> Option<&'a str> {
        if names.is_empty() {
            return None;
        }
        Some(names[self.rng.gen_range(0..names.len())])
    }
}
