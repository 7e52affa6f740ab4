#![warn(missing_docs, unused_imports)]

//! Differentially private streaming sums.
//!
//! Values arrive one at a time and every insertion releases a noisy prefix
//! sum computed with the binary (hierarchical) mechanism: the stream is
//! covered by dyadic intervals, each interval carries one independent
//! Gaussian draw, and a prefix query combines `O(log n)` of them.
//!
//! ```
//! use privsum::LocalService;
//! use privsum_traits::AggregationService;
//!
//! let service = LocalService::with_seed(0);
//! service.initialize(4, 0.0)?;
//! for value in [1.0, 2.0, 3.0, 4.0] {
//!     service.insert(value)?;
//! }
//! assert_eq!(service.read_sum()?, 10.0);
//! # Ok::<(), privsum::Error>(())
//! ```

mod errors;
mod noise;
mod service;
mod stream;
mod tree;

pub use errors::{Error, Result};
pub use noise::GaussianNoise;
pub use service::LocalService;
pub use stream::PrivateStream;
pub use tree::AggregationTree;
