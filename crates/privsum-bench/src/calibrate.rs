//! Baseline workloads: adaptive calibration or a fixed size.

use std::time::Duration;

use privsum::{Error, Result};
use privsum_traits::AggregationService;
use tracing::info;

use crate::config::{CalibrationSettings, WorkloadSettings};
use crate::measure::create_dataset;
use crate::records::{CalibratedWorkload, Workload};
use crate::runner::BenchmarkRunner;

/// The size tried after `size`: `max(size + 1, min(max_size, size * growth))`.
pub fn next_size(size: usize, max_size: usize, growth_factor: usize) -> usize {
    (size + 1).max(max_size.min(size.saturating_mul(growth_factor)))
}

impl<'a, S> BenchmarkRunner<'a, S>
where
    S: AggregationService<Error = Error>,
{
    /// Grows the dataset until one pass takes at least the target latency.
    ///
    /// Starting from `initial_size`, each attempt measures the current size.
    /// The search stops at the first size whose average latency reaches the
    /// target, or when the next size would exceed `max_size`. It never
    /// shrinks.
    pub fn calibrate(
        &mut self,
        settings: &CalibrationSettings,
        threads: usize,
    ) -> Result<CalibratedWorkload> {
        settings.validate()?;
        let executed_threads = self.pool.effective_threads(threads);
        let mut size = settings.initial_size;
        let mut attempts = 0;
        let mut average_latency;

        loop {
            let dataset = create_dataset(size);
            average_latency = self.measure(
                &dataset,
                settings.sigma,
                settings.warmup_iterations,
                settings.measure_iterations,
                executed_threads,
            )?;
            attempts += 1;
            info!(
                attempt = attempts,
                size,
                average_ms = millis(average_latency),
                "calibration attempt"
            );
            if average_latency >= settings.target_latency {
                break;
            }
            let next = next_size(size, settings.max_size, settings.growth_factor);
            if next == size || next > settings.max_size {
                break;
            }
            size = next;
        }

        Ok(CalibratedWorkload {
            workload: Workload {
                data_size: size,
                sigma: settings.sigma,
                warmup_iterations: settings.warmup_iterations,
                measure_iterations: settings.measure_iterations,
                requested_threads: threads,
                executed_threads,
            },
            average_latency,
            attempts,
        })
    }

    /// A baseline of fixed size, without measuring anything.
    pub fn prepare_workload(&self, settings: &WorkloadSettings, threads: usize) -> Workload {
        Workload {
            data_size: settings.data_size.max(1),
            sigma: settings.sigma,
            warmup_iterations: settings.warmup_iterations,
            measure_iterations: settings.measure_iterations,
            requested_threads: threads,
            executed_threads: self.pool.effective_threads(threads),
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parallelism;
    use privsum::LocalService;

    #[test]
    fn test_next_size() {
        assert_eq!(next_size(32, 1024, 2), 64);
        assert_eq!(next_size(600, 1024, 2), 1024);
        // At the ceiling the only way forward is past it.
        assert_eq!(next_size(1024, 1024, 2), 1025);
        assert_eq!(next_size(usize::MAX / 2 + 1, usize::MAX, 4), usize::MAX);
        // A factor of one grows linearly.
        assert_eq!(next_size(4, 8, 1), 5);
        assert_eq!(next_size(7, 8, 1), 8);
    }

    #[test]
    fn test_unit_growth_steps_by_one() {
        let service = LocalService::with_seed(0);
        let mut runner = BenchmarkRunner::new(&service, Parallelism::Unbounded).with_seed(1);
        let settings =
            CalibrationSettings::new(4, 8, 1, Duration::from_secs(3600), 0, 1, 0.0).unwrap();
        let calibrated = runner.calibrate(&settings, 1).unwrap();
        // 4, 5, 6, 7, 8
        assert_eq!(calibrated.attempts, 5);
        assert_eq!(calibrated.workload.data_size, 8);
    }

    #[test]
    fn test_unreachable_target_stops_at_max_size() {
        let service = LocalService::with_seed(0);
        let mut runner = BenchmarkRunner::new(&service, Parallelism::Unbounded).with_seed(1);
        let settings =
            CalibrationSettings::new(32, 1024, 2, Duration::from_secs(3600), 1, 1, 0.0).unwrap();
        let calibrated = runner.calibrate(&settings, 1).unwrap();
        // 32, 64, 128, 256, 512, 1024
        assert_eq!(calibrated.workload.data_size, 1024);
        assert_eq!(calibrated.attempts, 6);
        assert!(calibrated.average_latency < settings.target_latency);
    }

    #[test]
    fn test_reached_target_stops_immediately() {
        let service = LocalService::with_seed(0);
        let mut runner = BenchmarkRunner::new(&service, Parallelism::Unbounded).with_seed(1);
        let settings = CalibrationSettings::new(64, 4096, 10, Duration::ZERO, 2, 1, 0.0).unwrap();
        let calibrated = runner.calibrate(&settings, 1).unwrap();
        assert_eq!(calibrated.workload.data_size, 64);
        assert_eq!(calibrated.attempts, 1);
    }

    #[test]
    fn test_calibration_records_threads() {
        let service = LocalService::with_seed(0);
        let mut runner = BenchmarkRunner::new(&service, Parallelism::bounded(2).unwrap());
        let settings = CalibrationSettings::new(16, 64, 4, Duration::ZERO, 0, 1, 0.25).unwrap();
        let calibrated = runner.calibrate(&settings, 8).unwrap();
        assert_eq!(calibrated.workload.requested_threads, 8);
        assert_eq!(calibrated.workload.executed_threads, 2);
        assert_eq!(calibrated.workload.sigma, 0.25);
    }

    #[test]
    fn test_prepare_workload() {
        let service = LocalService::with_seed(0);
        let runner = BenchmarkRunner::new(&service, Parallelism::bounded(4).unwrap());
        let settings = WorkloadSettings::new(1024, 3, 5, 0.5).unwrap();
        let workload = runner.prepare_workload(&settings, 16);
        assert_eq!(workload.data_size, 1024);
        assert_eq!(workload.requested_threads, 16);
        assert_eq!(workload.executed_threads, 4);
        assert_eq!(workload.warmup_iterations, 3);
        assert_eq!(workload.measure_iterations, 5);
    }
}
