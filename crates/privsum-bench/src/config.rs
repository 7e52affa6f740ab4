//! Benchmark configuration and validation.
//!
//! Everything the harness needs is gathered here once, at startup, and
//! passed down explicitly.

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use privsum::{Error, Result};
use serde::Serialize;

use crate::pool::DEFAULT_GRACE_PERIOD;

/// Upper bound on the number of calls outstanding against the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parallelism {
    /// At most this many workers run concurrently.
    Bounded(NonZeroUsize),
    /// No ceiling: every requested worker runs.
    Unbounded,
}

impl Parallelism {
    /// A ceiling of `threads` workers.
    pub fn bounded(threads: usize) -> Result<Self> {
        NonZeroUsize::new(threads)
            .map(Self::Bounded)
            .ok_or_else(|| Error::invalid_configuration("parallelism ceiling must be positive"))
    }

    /// The parallelism reported by the host, or a single worker when it
    /// cannot be determined.
    pub fn from_host() -> Self {
        Self::Bounded(thread::available_parallelism().unwrap_or(NonZeroUsize::MIN))
    }

    /// The number of workers that actually run for `requested` workers.
    pub fn cap(self, requested: usize) -> usize {
        let requested = requested.max(1);
        match self {
            Self::Bounded(ceiling) => requested.min(ceiling.get()),
            Self::Unbounded => requested,
        }
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Self::from_host()
    }
}

/// Settings of the adaptive search for a baseline dataset size.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationSettings {
    /// First dataset size tried.
    pub initial_size: usize,
    /// Largest dataset size tried.
    pub max_size: usize,
    /// Multiplier applied to the size after each attempt.
    pub growth_factor: usize,
    /// Average pass latency at which the search stops.
    #[serde(rename = "targetMillis", serialize_with = "crate::records::as_millis")]
    pub target_latency: Duration,
    /// Passes run and discarded before measuring.
    pub warmup_iterations: usize,
    /// Passes averaged into one measurement.
    pub measure_iterations: usize,
    /// Standard deviation of the per-node noise.
    pub sigma: f64,
}

impl CalibrationSettings {
    /// Creates validated calibration settings.
    pub fn new(
        initial_size: usize,
        max_size: usize,
        growth_factor: usize,
        target_latency: Duration,
        warmup_iterations: usize,
        measure_iterations: usize,
        sigma: f64,
    ) -> Result<Self> {
        let settings = Self {
            initial_size,
            max_size,
            growth_factor,
            target_latency,
            warmup_iterations,
            measure_iterations,
            sigma,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        if self.initial_size == 0 {
            return Err(Error::invalid_configuration("initial size must be positive"));
        }
        if self.max_size < self.initial_size {
            return Err(Error::invalid_configuration(format!(
                "max size {} is below initial size {}",
                self.max_size, self.initial_size
            )));
        }
        if self.growth_factor == 0 {
            return Err(Error::invalid_configuration("growth factor must be positive"));
        }
        validate_iterations(self.measure_iterations)?;
        validate_sigma(self.sigma)
    }
}

/// Settings of a fixed-size baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSettings {
    /// Number of values per pass.
    pub data_size: usize,
    /// Passes run and discarded before measuring.
    pub warmup_iterations: usize,
    /// Passes averaged into one measurement.
    pub measure_iterations: usize,
    /// Standard deviation of the per-node noise.
    pub sigma: f64,
}

impl WorkloadSettings {
    /// Creates validated workload settings.
    pub fn new(
        data_size: usize,
        warmup_iterations: usize,
        measure_iterations: usize,
        sigma: f64,
    ) -> Result<Self> {
        let settings = Self {
            data_size,
            warmup_iterations,
            measure_iterations,
            sigma,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        if self.data_size == 0 {
            return Err(Error::invalid_configuration("data size must be positive"));
        }
        validate_iterations(self.measure_iterations)?;
        validate_sigma(self.sigma)
    }
}

/// How the baseline workload is obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Baseline {
    /// Grow the dataset until a pass reaches the target latency.
    Calibrate(CalibrationSettings),
    /// Use a fixed dataset size.
    Fixed(WorkloadSettings),
}

impl Baseline {
    /// Standard deviation of the per-node noise.
    pub fn sigma(&self) -> f64 {
        match self {
            Self::Calibrate(settings) => settings.sigma,
            Self::Fixed(settings) => settings.sigma,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Calibrate(settings) => settings.validate(),
            Self::Fixed(settings) => settings.validate(),
        }
    }
}

/// Complete configuration of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchConfig {
    /// How the baseline workload is obtained.
    pub baseline: Baseline,
    /// Requested worker counts of the weak-scaling sweep.
    pub weak_thread_counts: Vec<usize>,
    /// Requested worker counts of the strong-scaling sweep.
    pub strong_thread_counts: Vec<usize>,
    /// Ceiling on concurrently running workers.
    pub parallelism: Parallelism,
    /// How long a finished pass waits for its worker threads to exit.
    #[serde(skip)]
    pub grace_period: Duration,
    /// Seed for service noise and dataset perturbation.
    pub seed: Option<u64>,
}

impl BenchConfig {
    /// Creates a validated configuration with the default ceiling and grace
    /// period.
    pub fn new(
        baseline: Baseline,
        weak_thread_counts: Vec<usize>,
        strong_thread_counts: Vec<usize>,
    ) -> Result<Self> {
        let config = Self {
            baseline,
            weak_thread_counts,
            strong_thread_counts,
            parallelism: Parallelism::default(),
            grace_period: DEFAULT_GRACE_PERIOD,
            seed: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.baseline.validate()?;
        validate_thread_counts("weak", &self.weak_thread_counts)?;
        validate_thread_counts("strong", &self.strong_thread_counts)
    }

    /// Worker count of the baseline: the smallest count of either sweep.
    pub fn baseline_threads(&self) -> usize {
        self.weak_thread_counts
            .iter()
            .chain(&self.strong_thread_counts)
            .copied()
            .min()
            .unwrap_or(1)
            .max(1)
    }
}

fn validate_iterations(measure_iterations: usize) -> Result<()> {
    if measure_iterations == 0 {
        return Err(Error::invalid_configuration(
            "measure iterations must be positive",
        ));
    }
    Ok(())
}

fn validate_sigma(sigma: f64) -> Result<()> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(Error::invalid_configuration(format!(
            "sigma must be non-negative and finite, got {sigma}"
        )));
    }
    Ok(())
}

fn validate_thread_counts(sweep: &str, counts: &[usize]) -> Result<()> {
    if counts.contains(&0) {
        return Err(Error::invalid_configuration(format!(
            "{sweep} scaling thread counts must be positive: {counts:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration() -> CalibrationSettings {
        CalibrationSettings::new(32, 1024, 2, Duration::from_millis(5), 2, 1, 0.25).unwrap()
    }

    #[test]
    fn test_parallelism_cap() {
        let two = Parallelism::bounded(2).unwrap();
        assert_eq!(two.cap(1), 1);
        assert_eq!(two.cap(2), 2);
        assert_eq!(two.cap(8), 2);
        assert_eq!(two.cap(0), 1);
        assert_eq!(Parallelism::Unbounded.cap(64), 64);
        assert_eq!(Parallelism::Unbounded.cap(0), 1);
        assert!(Parallelism::bounded(0).is_err());
        assert!(Parallelism::from_host().cap(usize::MAX) >= 1);
    }

    #[test]
    fn test_calibration_settings() {
        assert!(CalibrationSettings::new(0, 10, 2, Duration::ZERO, 0, 1, 0.0).is_err());
        assert!(CalibrationSettings::new(64, 32, 2, Duration::ZERO, 0, 1, 0.0).is_err());
        assert!(CalibrationSettings::new(32, 64, 0, Duration::ZERO, 0, 1, 0.0).is_err());
        assert!(CalibrationSettings::new(4, 8, 1, Duration::ZERO, 0, 1, 0.0).is_ok());
        assert!(CalibrationSettings::new(32, 64, 2, Duration::ZERO, 0, 0, 0.0).is_err());
        assert!(CalibrationSettings::new(32, 64, 2, Duration::ZERO, 0, 1, -0.1).is_err());
        assert!(CalibrationSettings::new(32, 32, 2, Duration::ZERO, 0, 1, 0.0).is_ok());
    }

    #[test]
    fn test_workload_settings() {
        assert!(WorkloadSettings::new(0, 3, 5, 0.5).is_err());
        assert!(WorkloadSettings::new(1024, 3, 0, 0.5).is_err());
        assert!(WorkloadSettings::new(1024, 3, 5, f64::INFINITY).is_err());
        assert!(WorkloadSettings::new(1024, 0, 5, 0.5).is_ok());
    }

    #[test]
    fn test_bench_config() {
        let config = BenchConfig::new(
            Baseline::Calibrate(calibration()),
            vec![4, 2, 8],
            vec![16, 2],
        )
        .unwrap();
        assert_eq!(config.baseline_threads(), 2);
        assert_eq!(config.baseline.sigma(), 0.25);

        let config = BenchConfig::new(Baseline::Calibrate(calibration()), vec![], vec![]).unwrap();
        assert_eq!(config.baseline_threads(), 1);

        assert!(BenchConfig::new(Baseline::Calibrate(calibration()), vec![1, 0], vec![1]).is_err());
    }
}
