use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A simplified RNG manager that provides deterministic seeding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    master_seed: u64,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self { master_seed: seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    // Get a new RNG for a component by hashing its name with master seed
    pub fn get_rng(&self, name: &str) -> ChaCha8Rng {
        let mut hasher = DefaultHasher::new();
        self.master_seed.hash(&mut hasher);
        name.hash(&mut hasher);
        ChaCha8Rng::seed_from_u64(hasher.finish())
    }
}

// Simple trait for adding RNG to components
pub trait WithRng {
    fn with_rng(self, rng: ChaCha8Rng) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_rng_manager_consistency() {
        let rng_manager = RngManager::new(42);

        let mut first_sequence = Vec::new();
        {
            let mut rng1 = rng_manager.get_rng("simplex");
            for _ in 0..5 {
                first_sequence.push(rng1.gen::<f64>());
            }
        }

        let mut second_sequence = Vec::new();
        {
            let mut rng2 = rng_manager.get_rng("simplex");
            for _ in 0..5 {
                second_sequence.push(rng2.gen::<f64>());
            }
        }

        assert_eq!(
            first_sequence, second_sequence,
            "RNG sequences should be identical for same seed and component name"
        );
    }

    #[test]
    fn test_rng_manager_different_components() {
        let rng_manager = RngManager::new(42);

        let mut sequence1 = Vec::new();
        let mut sequence2 = Vec::new();

        {
            let mut rng1 = rng_manager.get_rng("simplex");
            let mut rng2 = rng_manager.get_rng("turbulence");

            for _ in 0..5 {
                sequence1.push(rng1.gen::<f64>());
                sequence2.push(rng2.gen::<f64>());
            }
        }

        assert_ne!(
            sequence1, sequence2,
            "Different components should get different RNG sequences"
        );
    }
}
