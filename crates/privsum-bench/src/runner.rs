//! The benchmark runner and the complete calibration-then-sweep flow.

use std::time::Duration;

use privsum::{Error, GaussianNoise, Result};
use privsum_traits::AggregationService;
use tracing::{error, info, warn};

use crate::config::{Baseline, BenchConfig, Parallelism};
use crate::pool::{BoundedWorkerPool, Interrupt};
use crate::records::{BenchmarkSummary, ScalingResult};

/// Drives an aggregation service through measurement passes.
pub struct BenchmarkRunner<'a, S> {
    pub(crate) service: &'a S,
    pub(crate) pool: BoundedWorkerPool,
    pub(crate) noise: GaussianNoise,
    observer: Option<Box<dyn FnMut(&ScalingResult) + 'a>>,
}

impl<'a, S> BenchmarkRunner<'a, S>
where
    S: AggregationService<Error = Error>,
{
    /// A runner for `service` that never runs more than `parallelism`
    /// workers at once.
    pub fn new(service: &'a S, parallelism: Parallelism) -> Self {
        Self {
            service,
            pool: BoundedWorkerPool::new(parallelism),
            noise: GaussianNoise::from_entropy(),
            observer: None,
        }
    }

    /// A runner set up from `config`.
    pub fn from_config(service: &'a S, config: &BenchConfig) -> Self {
        let runner = Self::new(service, config.parallelism).with_grace_period(config.grace_period);
        match config.seed {
            Some(seed) => runner.with_seed(seed),
            None => runner,
        }
    }

    /// Makes dataset perturbation reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.noise = GaussianNoise::with_seed(seed);
        self
    }

    /// Sets the time a pass waits for its worker threads to exit.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.pool = self.pool.with_grace_period(grace_period);
        self
    }

    /// Shares `interrupt` with running passes.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.pool = self.pool.with_interrupt(interrupt);
        self
    }

    /// Calls `observer` with every scaling result as soon as it is measured.
    pub fn on_result(mut self, observer: impl FnMut(&ScalingResult) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// The ceiling on concurrent workers.
    pub fn parallelism(&self) -> Parallelism {
        self.pool.parallelism()
    }

    /// Runs one pass of `dataset` with `threads` workers requested.
    pub fn run_dataset(&mut self, dataset: &mut [f64], sigma: f64, threads: usize) -> Result<f64> {
        self.pool
            .run(self.service, dataset, sigma, threads, &mut self.noise)
    }

    pub(crate) fn notify(&mut self, result: &ScalingResult) {
        if let Some(observer) = self.observer.as_mut() {
            observer(result);
        }
    }

    /// Obtains the baseline described by `config`, then runs both sweeps.
    pub fn run(&mut self, config: &BenchConfig, execution_mode: &str) -> Result<BenchmarkSummary> {
        config.validate()?;
        let threads = config.baseline_threads();
        let (workload, calibration) = match &config.baseline {
            Baseline::Calibrate(settings) => {
                let calibrated = self.calibrate(settings, threads).map_err(report_failure)?;
                (calibrated.workload.clone(), Some(calibrated))
            }
            Baseline::Fixed(settings) => (self.prepare_workload(settings, threads), None),
        };
        info!(
            data_size = workload.data_size,
            threads = workload.executed_threads,
            "prepared baseline workload"
        );

        let weak_scaling = self
            .run_weak_scaling(&workload, &config.weak_thread_counts)
            .map_err(report_failure)?;
        let strong_scaling = self
            .run_strong_scaling(&workload, &config.strong_thread_counts)
            .map_err(report_failure)?;

        Ok(BenchmarkSummary {
            execution_mode: execution_mode.to_string(),
            settings: config.baseline.clone(),
            parallelism: config.parallelism,
            workload,
            calibration,
            weak_thread_counts: config.weak_thread_counts.clone(),
            weak_scaling,
            strong_thread_counts: config.strong_thread_counts.clone(),
            strong_scaling,
        })
    }
}

fn report_failure(e: Error) -> Error {
    if e.is_interrupted() {
        warn!("benchmark interrupted");
    } else {
        error!(error = %e, "benchmark failed");
    }
    e
}
