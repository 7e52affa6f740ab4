//! Error types for the private aggregation stack.

use thiserror::Error;

/// The Result type for the privsum crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum encapsulating all the possible errors from this library.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Indicates a capacity, noise scale or harness setting outside its domain.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Indicates an insertion position outside of the tree.
    #[error("Index {index} is out of range for capacity {capacity}")]
    IndexOutOfRange {
        /// The rejected position.
        index: usize,
        /// The declared capacity of the tree.
        capacity: usize,
    },

    /// Indicates a call on a stream that was never initialized.
    #[error("Binary aggregation tree not initialised")]
    NotInitialized,

    /// Indicates one insertion more than the declared capacity.
    #[error("Binary aggregation tree capacity exceeded: capacity is {0}")]
    CapacityExceeded(usize),

    /// Indicates that a worker of a pass failed; the first failure wins.
    #[error("Worker {worker} failed: {source}")]
    WorkerFailure {
        /// Position of the failing worker's slice.
        worker: usize,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Indicates that a pass observed a raised interrupt.
    #[error("Benchmark interrupted")]
    Interrupted,

    /// Indicates a non-finite sum.
    #[error("Computation produced a non-finite value: {0}")]
    ComputationNaN(String),

    /// Indicates that a thread panicked while holding the service lock.
    #[error("Aggregation service lock poisoned")]
    Poisoned,

    /// Indicates that the worker threads could not be spawned.
    #[error("Unable to build worker pool: {0}")]
    ThreadPool(String),
}

impl Error {
    /// Create an invalid configuration error.
    pub fn invalid_configuration<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a worker failure error wrapping `cause`.
    pub fn worker_failure(worker: usize, cause: Error) -> Self {
        Self::WorkerFailure {
            worker,
            source: Box::new(cause),
        }
    }

    /// Create a non-finite computation error.
    pub fn computation_nan<S: Into<String>>(what: S) -> Self {
        Self::ComputationNaN(what.into())
    }

    /// Whether this error, or the cause it wraps, is an interruption.
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Interrupted => true,
            Self::WorkerFailure { source, .. } => source.is_interrupted(),
            _ => false,
        }
    }
}
