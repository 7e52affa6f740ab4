#![warn(missing_docs, unused_imports)]

//! Calibration and scaling harness for a private aggregation service.
//!
//! The harness calls the service through its serialized boundary from a
//! bounded pool of workers, and measures how the latency of a full pass
//! changes with the number of workers:
//!
//! - calibration grows the dataset until a pass reaches a target latency;
//! - weak scaling grows the dataset together with the number of workers;
//! - strong scaling keeps the dataset fixed.

mod calibrate;
mod measure;
mod runner;
mod scaling;

pub mod config;
pub mod pool;
pub mod records;

pub use calibrate::next_size;
pub use config::{Baseline, BenchConfig, CalibrationSettings, Parallelism, WorkloadSettings};
pub use measure::create_dataset;
pub use pool::{BoundedWorkerPool, Interrupt, WorkerPool};
pub use records::{BenchmarkSummary, CalibratedWorkload, ScalingResult, Workload};
pub use runner::BenchmarkRunner;
pub use scaling::{weak_scaling_plan, weak_scaling_size};
