//! # mmd-compute
//!
//! Compute backends and numeric collaborators for MMDStream.
//!
//! This crate provides implementations of the `JobBackend` trait:
//! - **CPU backend** (Rayon) - always available
//! - **CUDA backend** (NVIDIA) - feature-gated stub
//!
//! plus the pieces the streaming estimator needs around them: the job
//! dispatcher, block merging, kernels and Euclidean distances.
//!
//! ## Architecture
//!
//! The estimator in mmd-inference depends on the traits from mmd-core. The
//! dispatcher picks CPU or GPU once per call and applies it to every job.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cpu;
pub mod distance;
pub mod features;
pub mod kernel;
pub mod manager;

pub use cpu::CpuBackend;
pub use kernel::{CombinedKernel, CustomKernel, GaussianKernel, LinearKernel};
pub use manager::{ComputationManager, Device};

#[cfg(feature = "cuda")]
pub mod cuda;

#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;

/// Default GPU backend for this build, if any.
pub fn default_gpu_backend() -> Option<std::sync::Arc<dyn mmd_core::JobBackend>> {
    #[cfg(feature = "cuda")]
    {
        Some(std::sync::Arc::new(cuda::CudaBackend::new()))
    }
    #[cfg(not(feature = "cuda"))]
    {
        None
    }
}
