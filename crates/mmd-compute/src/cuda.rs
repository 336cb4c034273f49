//! CUDA job backend (NVIDIA).
//!
//! Feature-gated behind `cuda`.
//!
//! Current status: stub that compiles but returns `Error::NotImplemented`.
//! Selecting the GPU without this feature is reported by the
//! `ComputationManager` instead.

use mmd_core::{Error, GramMatrix, Job, JobBackend, Result};

/// CUDA backend (stub).
pub struct CudaBackend;

impl CudaBackend {
    /// Create a new CUDA backend (stub).
    pub fn new() -> Self {
        Self
    }
}

impl Default for CudaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBackend for CudaBackend {
    fn run(
        &self,
        _jobs: &[Job],
        _data: &[GramMatrix],
        _seed: u64,
        _round: u64,
        _first_block: usize,
    ) -> Result<Vec<Vec<f32>>> {
        Err(Error::NotImplemented("CUDA backend job dispatch".to_string()))
    }

    fn name(&self) -> &str {
        "CUDA"
    }
}
