//! Weak- and strong-scaling sweeps.

use privsum::{Error, Result};
use privsum_traits::AggregationService;
use tracing::info;

use crate::config::Parallelism;
use crate::measure::create_dataset;
use crate::records::{ScalingResult, Workload};
use crate::runner::BenchmarkRunner;

/// Dataset size of a weak-scaling point: the baseline's work per executed
/// worker, times the workers executed at this point.
pub fn weak_scaling_size(baseline: &Workload, executed_threads: usize) -> usize {
    let per_thread = (baseline.data_size as f64 / baseline.executed_threads.max(1) as f64).max(1.0);
    ((per_thread * executed_threads as f64).round() as usize).max(1)
}

/// A sorted copy of `counts`.
fn ascending(counts: &[usize]) -> Vec<usize> {
    let mut counts = counts.to_vec();
    counts.sort_unstable();
    counts
}

/// The dataset sizes a weak-scaling sweep over `counts` would measure.
pub fn weak_scaling_plan(
    baseline: &Workload,
    counts: &[usize],
    parallelism: Parallelism,
) -> Vec<(usize, usize, usize)> {
    ascending(counts)
        .into_iter()
        .map(|requested| {
            let executed = parallelism.cap(requested);
            (requested, executed, weak_scaling_size(baseline, executed))
        })
        .collect()
}

impl<'a, S> BenchmarkRunner<'a, S>
where
    S: AggregationService<Error = Error>,
{
    /// Grows the dataset with the number of workers.
    ///
    /// Results are in ascending order of requested workers and keep the
    /// requested count next to the executed one.
    pub fn run_weak_scaling(
        &mut self,
        baseline: &Workload,
        thread_counts: &[usize],
    ) -> Result<Vec<ScalingResult>> {
        let plan = weak_scaling_plan(baseline, thread_counts, self.parallelism());
        let mut results = Vec::with_capacity(plan.len());
        for (requested, executed, size) in plan {
            let dataset = create_dataset(size);
            let average_latency = self.measure(
                &dataset,
                baseline.sigma,
                baseline.warmup_iterations,
                baseline.measure_iterations,
                executed,
            )?;
            let result = ScalingResult {
                requested_threads: requested,
                executed_threads: executed,
                dataset_extent: size,
                iterations: baseline.measure_iterations,
                average_latency,
            };
            info!(
                requested,
                executed,
                size,
                average_us = average_latency.as_micros() as u64,
                "weak scaling"
            );
            self.notify(&result);
            results.push(result);
        }
        Ok(results)
    }

    /// Keeps the dataset fixed while the number of workers grows.
    ///
    /// One dataset of the baseline size is built and reused at every point.
    pub fn run_strong_scaling(
        &mut self,
        baseline: &Workload,
        thread_counts: &[usize],
    ) -> Result<Vec<ScalingResult>> {
        let dataset = create_dataset(baseline.data_size);
        let mut results = Vec::with_capacity(thread_counts.len());
        for requested in ascending(thread_counts) {
            let executed = self.pool.effective_threads(requested);
            let average_latency = self.measure(
                &dataset,
                baseline.sigma,
                baseline.warmup_iterations,
                baseline.measure_iterations,
                executed,
            )?;
            let result = ScalingResult {
                requested_threads: requested,
                executed_threads: executed,
                dataset_extent: dataset.len(),
                iterations: baseline.measure_iterations,
                average_latency,
            };
            info!(
                requested,
                executed,
                size = dataset.len(),
                average_us = average_latency.as_micros() as u64,
                "strong scaling"
            );
            self.notify(&result);
            results.push(result);
        }
        Ok(results)
    }
}
