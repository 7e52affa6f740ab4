//! Gaussian noise for the aggregation tree.

use privsum_traits::NoiseSource;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::StandardNormal;

/// Gaussian noise generator backed by an arbitrary random number generator.
#[derive(Debug, Clone)]
pub struct GaussianNoise<R: RngCore = ChaCha20Rng> {
    rng: R,
}

impl GaussianNoise<ChaCha20Rng> {
    /// Create a generator seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self::new(ChaCha20Rng::from_entropy())
    }

    /// Create a generator with a fixed seed, for reproducible noise.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(ChaCha20Rng::seed_from_u64(seed))
    }
}

impl<R: RngCore> GaussianNoise<R> {
    /// Wrap an existing random number generator.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: RngCore> NoiseSource for GaussianNoise<R> {
    fn sample(&mut self, std_dev: f64) -> f64 {
        if std_dev == 0.0 {
            return 0.0;
        }
        let z: f64 = self.rng.sample(StandardNormal);
        z * std_dev
    }
}
