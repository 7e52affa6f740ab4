//! Records produced by the harness.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::config::{Baseline, Parallelism};

/// Serializes a duration as fractional milliseconds.
pub(crate) fn as_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_nanos() as f64 / 1e6)
}

/// The baseline workload that scaling sweeps derive their datasets from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    /// Number of values per pass.
    pub data_size: usize,
    /// Standard deviation of the per-node noise.
    pub sigma: f64,
    /// Passes run and discarded before measuring.
    pub warmup_iterations: usize,
    /// Passes averaged into one measurement.
    pub measure_iterations: usize,
    /// Workers asked for.
    pub requested_threads: usize,
    /// Workers that ran, after the parallelism ceiling.
    pub executed_threads: usize,
}

/// A workload found by calibration, with the measurement that accepted it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibratedWorkload {
    /// The accepted workload.
    #[serde(flatten)]
    pub workload: Workload,
    /// Average pass latency at the accepted size.
    #[serde(rename = "avgTimeMillis", serialize_with = "as_millis")]
    pub average_latency: Duration,
    /// Number of sizes measured.
    pub attempts: usize,
}

/// One point of a scaling sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingResult {
    /// Workers asked for.
    #[serde(rename = "threads")]
    pub requested_threads: usize,
    /// Workers that ran, after the parallelism ceiling.
    pub executed_threads: usize,
    /// Number of values per pass.
    #[serde(rename = "dataSize")]
    pub dataset_extent: usize,
    /// Passes averaged into the latency.
    pub iterations: usize,
    /// Average wall-clock latency of one pass.
    #[serde(rename = "avgTimeMillis", serialize_with = "as_millis")]
    pub average_latency: Duration,
}

/// A strong-scaling point as it appears in the summary, where the fixed
/// dataset is reported as `totalSize`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StrongPoint {
    threads: usize,
    executed_threads: usize,
    total_size: usize,
    iterations: usize,
    #[serde(rename = "avgTimeMillis", serialize_with = "as_millis")]
    average_latency: Duration,
}

impl From<&ScalingResult> for StrongPoint {
    fn from(result: &ScalingResult) -> Self {
        Self {
            threads: result.requested_threads,
            executed_threads: result.executed_threads,
            total_size: result.dataset_extent,
            iterations: result.iterations,
            average_latency: result.average_latency,
        }
    }
}

fn as_strong_points<S: Serializer>(
    results: &[ScalingResult],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(results.iter().map(StrongPoint::from))
}

/// Everything a benchmark run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSummary {
    /// Label of the service implementation that was measured.
    pub execution_mode: String,
    /// How the baseline was obtained.
    pub settings: Baseline,
    /// Ceiling on concurrently running workers.
    pub parallelism: Parallelism,
    /// The baseline workload.
    pub workload: Workload,
    /// The calibration outcome, when the baseline was calibrated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibratedWorkload>,
    /// Requested worker counts of the weak-scaling sweep, as configured.
    pub weak_thread_counts: Vec<usize>,
    /// Weak-scaling results in ascending worker order.
    pub weak_scaling: Vec<ScalingResult>,
    /// Requested worker counts of the strong-scaling sweep, as configured.
    pub strong_thread_counts: Vec<usize>,
    /// Strong-scaling results in ascending worker order.
    #[serde(serialize_with = "as_strong_points")]
    pub strong_scaling: Vec<ScalingResult>,
}

impl BenchmarkSummary {
    /// Pretty-printed JSON.
    pub fn to_pretty_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
