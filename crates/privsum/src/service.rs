//! In-process implementation of the aggregation service boundary.

use std::sync::{Mutex, MutexGuard};

use privsum_traits::{AggregationService, NoiseSource};

use crate::{Error, GaussianNoise, PrivateStream, Result};

/// A [`PrivateStream`] behind a single mutex.
///
/// Every call locks the same mutex, so the tree is mutated by one thread at
/// a time no matter how many workers call concurrently.
#[derive(Debug)]
pub struct LocalService<N: NoiseSource = GaussianNoise> {
    stream: Mutex<PrivateStream<N>>,
}

impl LocalService<GaussianNoise> {
    /// Creates a service drawing noise from system entropy.
    pub fn new() -> Self {
        Self::from_stream(PrivateStream::new())
    }

    /// Creates a service with reproducible noise.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_stream(PrivateStream::with_noise(GaussianNoise::with_seed(seed)))
    }
}

impl Default for LocalService<GaussianNoise> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NoiseSource> LocalService<N> {
    /// Wraps an existing stream.
    pub fn from_stream(stream: PrivateStream<N>) -> Self {
        Self {
            stream: Mutex::new(stream),
        }
    }

    /// Number of values inserted since the last initialization.
    pub fn inserted(&self) -> Result<usize> {
        Ok(self.lock()?.inserted())
    }

    /// Consumes the service and returns the stream.
    pub fn into_inner(self) -> Result<PrivateStream<N>> {
        self.stream.into_inner().map_err(|_| Error::Poisoned)
    }

    fn lock(&self) -> Result<MutexGuard<'_, PrivateStream<N>>> {
        self.stream.lock().map_err(|_| Error::Poisoned)
    }
}

impl<N: NoiseSource + Send> AggregationService for LocalService<N> {
    type Error = Error;

    fn initialize(&self, capacity: usize, sigma: f64) -> Result<()> {
        self.lock()?.initialize(capacity, sigma)
    }

    fn insert(&self, value: f64) -> Result<f64> {
        self.lock()?.insert(value)
    }

    fn read_sum(&self) -> Result<f64> {
        self.lock()?.read_sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_protocol_errors() {
        let service = LocalService::with_seed(1);
        assert_eq!(service.insert(1.0), Err(Error::NotInitialized));
        assert_eq!(service.read_sum(), Err(Error::NotInitialized));

        service.initialize(1, 0.0).unwrap();
        assert_eq!(service.insert(2.5), Ok(2.5));
        assert_eq!(service.insert(2.5), Err(Error::CapacityExceeded(1)));
    }

    #[test]
    fn test_concurrent_inserts_are_serialized() {
        let service = LocalService::with_seed(2);
        let threads = 8;
        let per_thread = 250;
        service.initialize(threads * per_thread, 0.0).unwrap();

        thread::scope(|s| {
            for _ in 0..threads {
                s.spawn(|| {
                    for _ in 0..per_thread {
                        service.insert(1.0).unwrap();
                    }
                });
            }
        });

        assert_eq!(service.inserted(), Ok(threads * per_thread));
        assert_eq!(service.read_sum(), Ok((threads * per_thread) as f64));
        assert_eq!(service.insert(1.0), Err(Error::CapacityExceeded(threads * per_thread)));
    }

    #[test]
    fn test_poisoned_lock() {
        let service = LocalService::with_seed(3);
        service.initialize(4, 0.0).unwrap();
        let _ = thread::scope(|s| {
            s.spawn(|| {
                let _guard = service.stream.lock().unwrap();
                panic!("worker panicked while holding the lock");
            })
            .join()
        });
        assert_eq!(service.insert(1.0), Err(Error::Poisoned));
        assert!(matches!(service.into_inner(), Err(Error::Poisoned)));
    }
}
