//! Data-parallel job dispatch.
//!
//! A `ComputationManager` holds a queue of jobs and one batch of Gram
//! matrices. Each call to [`ComputationManager::compute_data_parallel_jobs`]
//! runs every job over every matrix on the selected backend; results are kept
//! per job until the next dispatch.
//!
//! Randomized jobs are seeded per (round, global block index). A batch is
//! tagged with the stream index of its first block, so seeded results do not
//! depend on how the stream is cut into bursts.

use crate::cpu::CpuBackend;
use mmd_core::{Error, GramMatrix, Job, JobBackend, Result};
use std::sync::Arc;

/// Backend selection for one dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// CPU thread pool.
    Cpu,
    /// GPU backend (requires one to be registered).
    Gpu,
}

/// Queue of per-block jobs plus the current batch of kernel matrices.
pub struct ComputationManager {
    cpu: Arc<CpuBackend>,
    gpu: Option<Arc<dyn JobBackend>>,
    device: Device,
    jobs: Vec<Job>,
    data: Vec<GramMatrix>,
    results: Vec<Vec<f32>>,
    seed: u64,
    round: u64,
    first_block: usize,
}

impl ComputationManager {
    /// Create a manager over the given backends. `seed` drives randomized jobs.
    pub fn new(cpu: Arc<CpuBackend>, gpu: Option<Arc<dyn JobBackend>>, seed: u64) -> Self {
        Self {
            cpu,
            gpu,
            device: Device::Cpu,
            jobs: Vec::new(),
            data: Vec::new(),
            results: Vec::new(),
            seed,
            round: 0,
            first_block: 0,
        }
    }

    /// Append a job; its results are available at the same index.
    pub fn enqueue_job(&mut self, job: Job) {
        self.jobs.push(job);
    }

    /// Number of enqueued jobs.
    pub fn num_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Replace the batch of kernel matrices; `data[0]` is stream block `first_block`.
    pub fn set_data(&mut self, data: Vec<GramMatrix>, first_block: usize) {
        self.data = data;
        self.first_block = first_block;
    }

    /// Select the seeding round for subsequent dispatches (e.g. a null sample slot).
    pub fn set_round(&mut self, round: u64) -> &mut Self {
        self.round = round;
        self
    }

    /// Number of matrices in the current batch.
    pub fn num_data(&self) -> usize {
        self.data.len()
    }

    /// Dispatch subsequent calls on the CPU.
    pub fn use_cpu(&mut self) -> &mut Self {
        self.device = Device::Cpu;
        self
    }

    /// Dispatch subsequent calls on the GPU.
    pub fn use_gpu(&mut self) -> &mut Self {
        self.device = Device::Gpu;
        self
    }

    /// Selected device.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Name of the backend the next dispatch would use.
    pub fn backend_name(&self) -> &str {
        match self.device {
            Device::Cpu => self.cpu.name(),
            Device::Gpu => self.gpu.as_ref().map(|g| g.name()).unwrap_or("GPU (unavailable)"),
        }
    }

    /// Run every job over the current batch.
    ///
    /// Repeated calls over the same batch and round see the same seeds; change
    /// the round with [`Self::set_round`] for fresh permutations.
    pub fn compute_data_parallel_jobs(&mut self) -> Result<()> {
        let (round, first) = (self.round, self.first_block);
        log::trace!(
            "round {round}, blocks {first}..{}: {} jobs on {}",
            first + self.data.len(),
            self.jobs.len(),
            self.backend_name()
        );
        self.results = match self.device {
            Device::Cpu => self.cpu.run(&self.jobs, &self.data, self.seed, round, first)?,
            Device::Gpu => {
                let gpu = self.gpu.as_ref().ok_or_else(|| {
                    Error::NotImplemented(
                        "GPU job dispatch requested but no GPU backend is available \
                         (build mmd-compute with the `cuda` feature)"
                            .to_string(),
                    )
                })?;
                gpu.run(&self.jobs, &self.data, self.seed, round, first)?
            }
        };
        Ok(())
    }

    /// Results of job `index` from the last dispatch, one scalar per matrix.
    pub fn result(&self, index: usize) -> Result<&[f32]> {
        self.results.get(index).map(|r| r.as_slice()).ok_or_else(|| {
            Error::Computation(format!(
                "no result for job {index} ({} jobs dispatched)",
                self.results.len()
            ))
        })
    }

    /// Release jobs, data and results.
    pub fn done(&mut self) {
        self.jobs.clear();
        self.data.clear();
        self.results.clear();
    }
}
