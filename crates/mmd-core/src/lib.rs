//! # mmd-core
//!
//! Core types, traits, and error handling for MMDStream.
//!
//! This crate provides:
//! - Common error types
//! - Collaborator traits (DataSource, Kernel, JobBackend)
//! - Shared data structures (feature blocks, bursts, estimator enums)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{DataSource, Job, JobBackend, Kernel, item_seed};
pub use types::{
    Burst, DenseFeatures, GramMatrix, KernelSelectionMethod, NullApproximationMethod,
    StatisticType, VarianceEstimationMethod,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
