//! Warm-up and measurement iterations.

use std::time::{Duration, Instant};

use privsum::{Error, Result};
use privsum_traits::AggregationService;
use tracing::debug;

use crate::runner::BenchmarkRunner;

/// The values `1, 2, ..., size`.
pub fn create_dataset(size: usize) -> Vec<f64> {
    (1..=size).map(|i| i as f64).collect()
}

impl<'a, S> BenchmarkRunner<'a, S>
where
    S: AggregationService<Error = Error>,
{
    /// Average wall-clock latency of one pass over `dataset`.
    ///
    /// Runs `warmup_iterations` passes on a throwaway copy of the dataset,
    /// then times `measure_iterations` passes on a fresh copy as one span.
    /// Every pass perturbs its copy, so consecutive passes differ.
    pub fn measure(
        &mut self,
        dataset: &[f64],
        sigma: f64,
        warmup_iterations: usize,
        measure_iterations: usize,
        threads: usize,
    ) -> Result<Duration> {
        if measure_iterations == 0 {
            return Err(Error::invalid_configuration(
                "measure iterations must be positive",
            ));
        }
        if warmup_iterations > 0 {
            let mut warmup = dataset.to_vec();
            self.execute_iterations(&mut warmup, sigma, warmup_iterations, threads)?;
        }
        let mut measured = dataset.to_vec();
        let average = self.execute_iterations(&mut measured, sigma, measure_iterations, threads)?;
        debug!(
            size = dataset.len(),
            threads,
            average_us = average.as_micros() as u64,
            "measured"
        );
        Ok(average)
    }

    fn execute_iterations(
        &mut self,
        dataset: &mut [f64],
        sigma: f64,
        iterations: usize,
        threads: usize,
    ) -> Result<Duration> {
        let start = Instant::now();
        let mut last = 0.0;
        for _ in 0..iterations {
            last = self.run_dataset(dataset, sigma, threads)?;
        }
        let elapsed = start.elapsed();
        if last.is_nan() {
            return Err(Error::computation_nan("final iteration sum"));
        }
        Ok(elapsed.div_f64(iterations as f64))
    }
}
