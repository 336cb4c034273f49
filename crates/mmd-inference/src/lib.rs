//! # mmd-inference
//!
//! Streaming kernel two-sample testing for MMDStream.
//!
//! This crate provides:
//! - Per-block MMD estimators and the job factory mapping them to dispatchable jobs
//! - Welford accumulators for unbounded streams
//! - `StreamingMmd`: statistic/variance aggregation, null sampling and the
//!   multi-kernel statistic/Q estimator
//! - Kernel selection policies (median heuristic, max MMD, max test power,
//!   cross-validated rejection rate)
//! - p-values, thresholds and the full test
//!
//! ## Architecture
//!
//! The estimator only sees the `DataSource`, `Kernel` and `JobBackend` traits
//! from mmd-core; `BlockStream` is a ready-made in-memory source.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Estimator configuration
pub mod config;
/// In-memory block stream
pub mod data;
/// Hypothesis test helpers
pub mod hypotest;
/// Estimator job factory
pub mod jobs;
/// Per-block MMD estimators
pub mod mmd;
/// Kernel registry with trial overlays
pub mod registry;
/// Kernel selection policies
pub mod selection;
/// Streaming estimator
pub mod streaming;
/// Welford accumulators
pub mod welford;

pub use config::MmdConfig;
pub use data::BlockStream;
pub use hypotest::TestOutcome;
pub use jobs::EstimatorJobs;
pub use registry::KernelRegistry;
pub use selection::{
    KernelSelection, MaxMeasure, MaxTestPower, MaxXValidation, MedianHeuristic, solve_weights,
};
pub use streaming::StreamingMmd;
pub use welford::{RunningMean, RunningVariance};
