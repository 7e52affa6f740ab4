//! Stateful private stream over an aggregation tree.

use privsum_traits::NoiseSource;
use tracing::trace;

use crate::{AggregationTree, Error, GaussianNoise, Result};

/// State of an initialized stream.
#[derive(Debug, Clone)]
struct Ready {
    tree: AggregationTree,
    sigma: f64,
    inserted: usize,
    last_sum: f64,
}

/// A stream of values released as differentially private prefix sums.
///
/// The stream starts uninitialized. [`PrivateStream::initialize`] allocates a
/// fresh noise-seeded tree, after which up to `capacity` values can be
/// inserted at consecutive positions.
#[derive(Debug)]
pub struct PrivateStream<N: NoiseSource = GaussianNoise> {
    noise: N,
    state: Option<Ready>,
}

impl PrivateStream<GaussianNoise> {
    /// Creates an uninitialized stream drawing noise from system entropy.
    pub fn new() -> Self {
        Self::with_noise(GaussianNoise::from_entropy())
    }
}

impl Default for PrivateStream<GaussianNoise> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NoiseSource> PrivateStream<N> {
    /// Creates an uninitialized stream drawing noise from `noise`.
    pub fn with_noise(noise: N) -> Self {
        Self { noise, state: None }
    }

    /// Discards any previous tree and prepares a fresh one for `capacity`
    /// values with per-node noise of standard deviation `sigma`.
    ///
    /// On error the previous state is kept.
    pub fn initialize(&mut self, capacity: usize, sigma: f64) -> Result<()> {
        let tree = AggregationTree::new(capacity, sigma, &mut self.noise)?;
        trace!(capacity, sigma, "initialised aggregation tree");
        self.state = Some(Ready {
            tree,
            sigma,
            inserted: 0,
            last_sum: 0.0,
        });
        Ok(())
    }

    /// Inserts `value` at the next free position and returns the private sum
    /// of everything inserted so far.
    pub fn insert(&mut self, value: f64) -> Result<f64> {
        let ready = self.state.as_mut().ok_or(Error::NotInitialized)?;
        if ready.inserted >= ready.tree.capacity() {
            return Err(Error::CapacityExceeded(ready.tree.capacity()));
        }
        let sum = ready.tree.insert(ready.inserted, value)?;
        if sum.is_nan() {
            return Err(Error::computation_nan(format!(
                "prefix sum at position {}",
                ready.inserted
            )));
        }
        ready.last_sum = sum;
        ready.inserted += 1;
        Ok(sum)
    }

    /// The sum returned by the latest insertion, or `0.0` if nothing has
    /// been inserted since the last initialization.
    pub fn read_sum(&self) -> Result<f64> {
        self.state
            .as_ref()
            .map(|ready| ready.last_sum)
            .ok_or(Error::NotInitialized)
    }

    /// Whether [`PrivateStream::initialize`] has succeeded at least once.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// The number of values inserted since the last initialization.
    pub fn inserted(&self) -> usize {
        self.state.as_ref().map_or(0, |ready| ready.inserted)
    }

    /// The declared capacity, if initialized.
    pub fn capacity(&self) -> Option<usize> {
        self.state.as_ref().map(|ready| ready.tree.capacity())
    }

    /// The noise standard deviation, if initialized.
    pub fn sigma(&self) -> Option<f64> {
        self.state.as_ref().map(|ready| ready.sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> PrivateStream {
        PrivateStream::with_noise(GaussianNoise::with_seed(5))
    }

    #[test]
    fn test_uninitialized() {
        let mut stream = seeded();
        assert!(!stream.is_initialized());
        assert_eq!(stream.insert(1.0), Err(Error::NotInitialized));
        assert_eq!(stream.read_sum(), Err(Error::NotInitialized));
        assert_eq!(stream.capacity(), None);
    }

    #[test]
    fn test_invalid_initialization_keeps_state() {
        let mut stream = seeded();
        assert!(matches!(
            stream.initialize(0, 0.5),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(!stream.is_initialized());

        stream.initialize(4, 0.0).unwrap();
        stream.insert(2.0).unwrap();
        assert!(matches!(
            stream.initialize(4, -1.0),
            Err(Error::InvalidConfiguration(_))
        ));
        assert_eq!(stream.inserted(), 1);
        assert_eq!(stream.read_sum(), Ok(2.0));
    }

    #[test]
    fn test_read_sum_before_insert() {
        let mut stream = seeded();
        stream.initialize(8, 3.0).unwrap();
        assert_eq!(stream.read_sum(), Ok(0.0));
        assert_eq!(stream.sigma(), Some(3.0));
    }

    #[test]
    fn test_exact_sum_without_noise() {
        let data: Vec<f64> = (1..=1024).map(f64::from).collect();
        let expected: f64 = data.iter().sum();

        let mut stream = seeded();
        stream.initialize(data.len(), 0.0).unwrap();
        for value in &data {
            stream.insert(*value).unwrap();
        }
        assert!((stream.read_sum().unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut stream = seeded();
        stream.initialize(3, 1.0).unwrap();
        for value in [1.0, 2.0, 3.0] {
            stream.insert(value).unwrap();
        }
        let last = stream.read_sum().unwrap();
        assert_eq!(stream.insert(4.0), Err(Error::CapacityExceeded(3)));
        assert_eq!(stream.read_sum(), Ok(last));
        assert_eq!(stream.inserted(), 3);
    }

    #[test]
    fn test_reinitialize_resets() {
        let mut stream = seeded();
        stream.initialize(2, 0.0).unwrap();
        stream.insert(5.0).unwrap();
        stream.insert(6.0).unwrap();

        stream.initialize(3, 0.0).unwrap();
        assert_eq!(stream.inserted(), 0);
        assert_eq!(stream.read_sum(), Ok(0.0));
        assert_eq!(stream.insert(1.5), Ok(1.5));
        assert_eq!(stream.capacity(), Some(3));
    }

    #[test]
    fn test_nan_is_fatal() {
        let mut stream = seeded();
        stream.initialize(2, 0.0).unwrap();
        assert!(matches!(
            stream.insert(f64::NAN),
            Err(Error::ComputationNaN(_))
        ));
        assert_eq!(stream.inserted(), 0);
    }
}
