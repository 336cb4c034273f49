//! CPU job backend
//!
//! Primary backend that MUST work everywhere.
//!
//! Features:
//! - Rayon for work-stealing parallelism over blocks
//! - Optional dedicated thread pool (injected at construction, never global)
//! - Per-item seeding so randomized jobs are independent of scheduling

use mmd_core::{Error, GramMatrix, Job, JobBackend, Result, item_seed};
use rayon::prelude::*;

/// CPU job backend using Rayon for parallelism
pub struct CpuBackend {
    n_threads: usize,
    pool: Option<rayon::ThreadPool>,
}

impl CpuBackend {
    /// Create a CPU backend on the global Rayon pool
    pub fn new() -> Self {
        Self { n_threads: 0, pool: None }
    }

    /// Create a CPU backend with a dedicated pool of `n_threads` (0 = global pool)
    pub fn with_threads(n_threads: usize) -> Result<Self> {
        if n_threads == 0 {
            return Ok(Self::new());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .map_err(|e| Error::Computation(format!("failed to create thread pool: {e}")))?;
        Ok(Self { n_threads, pool: Some(pool) })
    }

    /// Configured thread count (0 = automatic)
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Run `f` inside this backend's pool.
    ///
    /// Nested `par_iter` calls inside `f` are scheduled on the same pool.
    pub fn install<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBackend for CpuBackend {
    fn run(
        &self,
        jobs: &[Job],
        data: &[GramMatrix],
        seed: u64,
        round: u64,
        first_block: usize,
    ) -> Result<Vec<Vec<f32>>> {
        Ok(self.install(|| {
            jobs.iter()
                .map(|job| {
                    data.par_iter()
                        .enumerate()
                        .map(|(i, km)| job(km, item_seed(seed, round, first_block + i)))
                        .collect()
                })
                .collect()
        }))
    }

    fn name(&self) -> &str {
        "CPU"
    }
}
