#![warn(missing_docs, unused_imports)]

//! Traits for the privsum library.

/// A source of independent, centered Gaussian noise.
pub trait NoiseSource {
    /// Draw one sample from N(0, std_dev²).
    ///
    /// A standard deviation of zero always yields exactly `0.0`.
    fn sample(&mut self, std_dev: f64) -> f64;

    /// Draw `n` independent samples from N(0, std_dev²).
    fn sample_vec(&mut self, std_dev: f64, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.sample(std_dev)).collect()
    }
}

/// The boundary through which a private sum is accumulated.
///
/// Implementations serialize every call internally, so a single instance can
/// be shared by reference between worker threads.
pub trait AggregationService: Sync {
    /// The error type returned by the service.
    type Error;

    /// Reset the service to accumulate `capacity` values, seeding every node
    /// of a fresh tree with noise of standard deviation `sigma`.
    fn initialize(&self, capacity: usize, sigma: f64) -> Result<(), Self::Error>;

    /// Insert the next value of the stream and return the private prefix sum
    /// after the insertion.
    fn insert(&self, value: f64) -> Result<f64, Self::Error>;

    /// The private prefix sum returned by the most recent insertion.
    fn read_sum(&self) -> Result<f64, Self::Error>;
}
