//! Streaming MMD estimator.
//!
//! [`StreamingMmd`] drives a [`DataSource`] burst by burst. Every burst is
//! merged and kernel-evaluated in parallel, the per-block jobs are dispatched
//! through a [`ComputationManager`], and the per-block scalars are folded into
//! Welford accumulators in block order. Nothing but the accumulators outlives
//! a burst.

use crate::config::MmdConfig;
use crate::jobs::EstimatorJobs;
use crate::mmd::{normalize_statistic, normalize_variance};
use crate::registry::KernelRegistry;
use crate::selection::{
    KernelSelection, MaxMeasure, MaxTestPower, MaxXValidation, MedianHeuristic,
};
use crate::welford::{RunningMean, RunningVariance};
use mmd_compute::distance::euclidean_distance_matrix;
use mmd_compute::features::merge;
use mmd_compute::{ComputationManager, CpuBackend};
use mmd_core::{
    Burst, DataSource, DenseFeatures, Error, GramMatrix, JobBackend, Kernel,
    KernelSelectionMethod, NullApproximationMethod, Result, StatisticType,
    VarianceEstimationMethod,
};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::sync::Arc;

/// Open `source`, feed every burst to `visit` until the stream is exhausted or
/// an empty burst ends it, then close it again (also when `visit` fails).
fn drive<S, F>(source: &mut S, visit: F) -> Result<()>
where
    S: DataSource,
    F: FnMut(Burst) -> Result<()>,
{
    source.start()?;
    let outcome = drain(source, visit);
    source.end();
    outcome
}

fn drain<S, F>(source: &mut S, mut visit: F) -> Result<()>
where
    S: DataSource,
    F: FnMut(Burst) -> Result<()>,
{
    while let Some(burst) = source.next_burst()?.filter(|b| !b.is_empty()) {
        visit(burst)?;
    }
    Ok(())
}

/// Merge every (P, Q) block pair of `burst` in parallel.
fn merge_samples(cpu: &CpuBackend, burst: &Burst, bx: usize, by: usize) -> Result<Vec<DenseFeatures>> {
    if let Some((i, (p, q))) = burst
        .p
        .iter()
        .zip(&burst.q)
        .enumerate()
        .find(|(_, (p, q))| p.num_vectors() != bx || q.num_vectors() != by)
    {
        return Err(Error::Stream(format!(
            "block {i} has {} P and {} Q samples, expected {bx} and {by}",
            p.num_vectors(),
            q.num_vectors()
        )));
    }
    cpu.install(|| burst.p.par_iter().zip(burst.q.par_iter()).map(|(p, q)| merge(p, q)).collect())
}

/// Evaluate `kernel` over every merged block in parallel.
///
/// Any failure aborts the whole burst.
fn compute_kernel(
    cpu: &CpuBackend,
    blocks: &[DenseFeatures],
    kernel: &Arc<dyn Kernel>,
) -> Result<Vec<GramMatrix>> {
    if kernel.is_precomputed() {
        return Err(Error::Config(format!(
            "kernel {} is precomputed and cannot be evaluated on streamed blocks",
            kernel.name()
        )));
    }
    cpu.install(|| blocks.par_iter().map(|b| kernel.kernel_matrix(b)).collect::<Result<Vec<_>>>())
        .map_err(|e| match e {
            Error::Evaluation(_) => e,
            other => Error::Evaluation(format!("kernel {} failed on a block: {other}", kernel.name())),
        })
}

/// Index of `(i, j)` with `j <= i` in a packed lower triangle.
#[inline]
fn lower_index(i: usize, j: usize) -> usize {
    i * (i + 1) / 2 + j
}

/// Streaming kernel two-sample test over a [`DataSource`].
pub struct StreamingMmd<S: DataSource> {
    pub(crate) source: S,
    pub(crate) config: MmdConfig,
    seed: u64,
    kernels: KernelRegistry,
    candidates: KernelRegistry,
    cpu: Arc<CpuBackend>,
    gpu: Option<Arc<dyn JobBackend>>,
}

impl<S: DataSource> std::fmt::Debug for StreamingMmd<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingMmd")
            .field("config", &self.config)
            .field("seed", &self.seed)
            .field("kernels", &self.kernels)
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

impl<S: DataSource> StreamingMmd<S> {
    /// Estimator over `source` with a CPU pool sized by `config.n_threads` and
    /// the build's default GPU backend.
    pub fn new(source: S, config: MmdConfig) -> Result<Self> {
        let cpu = Arc::new(CpuBackend::with_threads(config.n_threads)?);
        Self::with_backends(source, config, cpu, mmd_compute::default_gpu_backend())
    }

    /// Estimator with explicitly injected backends.
    pub fn with_backends(
        source: S,
        config: MmdConfig,
        cpu: Arc<CpuBackend>,
        gpu: Option<Arc<dyn JobBackend>>,
    ) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        Ok(Self {
            source,
            config,
            seed,
            kernels: KernelRegistry::with_empty_slots(1),
            candidates: KernelRegistry::new(),
            cpu,
            gpu,
        })
    }

    // --- configuration ---

    /// Current configuration.
    pub fn config(&self) -> &MmdConfig {
        &self.config
    }

    /// Per-block estimator.
    pub fn statistic_type(&self) -> StatisticType {
        self.config.statistic_type
    }

    /// Set the per-block estimator.
    pub fn set_statistic_type(&mut self, statistic_type: StatisticType) {
        self.config.statistic_type = statistic_type;
    }

    /// Variance estimation method.
    pub fn variance_estimation_method(&self) -> VarianceEstimationMethod {
        self.config.variance_estimation_method
    }

    /// Set the variance estimation method.
    pub fn set_variance_estimation_method(&mut self, method: VarianceEstimationMethod) {
        self.config.variance_estimation_method = method;
    }

    /// Null approximation method.
    pub fn null_approximation_method(&self) -> NullApproximationMethod {
        self.config.null_approximation_method
    }

    /// Set the null approximation method.
    pub fn set_null_approximation_method(&mut self, method: NullApproximationMethod) {
        self.config.null_approximation_method = method;
    }

    /// Number of null samples drawn by [`Self::sample_null`].
    pub fn num_null_samples(&self) -> usize {
        self.config.num_null_samples
    }

    /// Set the number of null samples.
    pub fn set_num_null_samples(&mut self, n: usize) {
        self.config.num_null_samples = n;
    }

    /// Whether jobs are dispatched on the GPU.
    pub fn use_gpu(&self) -> bool {
        self.config.use_gpu
    }

    /// Dispatch jobs on the GPU (`true`) or CPU (`false`).
    pub fn set_use_gpu(&mut self, use_gpu: bool) {
        self.config.use_gpu = use_gpu;
    }

    /// Seed driving permutations.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Reseed permutations.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.config.seed = Some(seed);
    }

    // --- kernels ---

    /// Commit `kernel` as the active kernel.
    pub fn set_kernel(&mut self, kernel: Arc<dyn Kernel>) {
        self.kernels.commit(0, kernel);
        self.kernels.restore(0);
    }

    /// Active kernel (including a running trial).
    pub fn kernel(&self) -> Option<Arc<dyn Kernel>> {
        self.kernels.at(0)
    }

    /// Register a candidate kernel for selection.
    pub fn add_kernel(&mut self, kernel: Arc<dyn Kernel>) {
        self.candidates.push(kernel);
    }

    /// Number of candidate kernels.
    pub fn num_candidates(&self) -> usize {
        self.candidates.len()
    }

    pub(crate) fn candidate_kernels(&self) -> Vec<Arc<dyn Kernel>> {
        self.candidates.current()
    }

    /// Drop all trial overlays; committed kernels are kept.
    pub fn cleanup(&mut self) {
        self.kernels.restore_all();
        self.candidates.restore_all();
    }

    /// Run `f` with `kernel` trialled in the active slot, then restore it.
    pub(crate) fn with_trial_kernel<R>(
        &mut self,
        kernel: Arc<dyn Kernel>,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.kernels.trial(0, kernel);
        let out = f(self);
        self.kernels.restore(0);
        out
    }

    /// Borrow the data source.
    pub fn data_source(&self) -> &S {
        &self.source
    }

    /// Mutably borrow the data source.
    pub fn data_source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Name of the backend jobs are dispatched on.
    pub fn backend_name(&self) -> String {
        self.manager().backend_name().to_string()
    }

    fn active_kernel(&self) -> Result<Arc<dyn Kernel>> {
        self.kernels
            .at(0)
            .ok_or_else(|| Error::Config("no kernel set, call set_kernel or select_kernel first".to_string()))
    }

    fn blocksizes(&self) -> (usize, usize) {
        (self.source.blocksize(0), self.source.blocksize(1))
    }

    fn manager(&self) -> ComputationManager {
        let mut cm = ComputationManager::new(self.cpu.clone(), self.gpu.clone(), self.seed);
        if self.config.use_gpu {
            cm.use_gpu();
        } else {
            cm.use_cpu();
        }
        cm
    }

    // --- estimation ---

    /// Stream the data once and return `(statistic, variance)`.
    pub fn compute_statistic_variance(&mut self) -> Result<(f64, f64)> {
        let kernel = self.active_kernel()?;
        let (bx, by) = self.blocksizes();
        let jobs = EstimatorJobs::new(self.config.statistic_type, bx, by)?;
        let method = self.config.variance_estimation_method;

        let mut cm = self.manager();
        cm.enqueue_job(jobs.statistic_job());
        cm.enqueue_job(jobs.variance_job(method)?);

        let mut statistic = RunningMean::new();
        let mut direct = RunningMean::new();
        let mut permuted = RunningVariance::new();
        let cpu = self.cpu.clone();
        let mut bursts = 0usize;

        drive(&mut self.source, |burst| {
            let blocks = merge_samples(&cpu, &burst, bx, by)?;
            cm.set_data(compute_kernel(&cpu, &blocks, &kernel)?, statistic.count());
            cm.compute_data_parallel_jobs()?;
            for &x in cm.result(0)? {
                statistic.push(x as f64);
            }
            for &x in cm.result(1)? {
                match method {
                    VarianceEstimationMethod::Direct => direct.push(x as f64),
                    VarianceEstimationMethod::Permutation => permuted.push(x as f64),
                }
            }
            bursts += 1;
            log::debug!("burst {bursts}: {} blocks, running statistic {:.6e}", blocks.len(), statistic.mean());
            Ok(())
        })?;
        cm.done();

        let num_blocks = statistic.count();
        if num_blocks == 0 {
            return Err(Error::Stream("data source produced no blocks".to_string()));
        }
        let variance = match method {
            VarianceEstimationMethod::Direct => direct.mean(),
            VarianceEstimationMethod::Permutation => normalize_variance(permuted.m2(), num_blocks),
        };
        Ok((normalize_statistic(statistic.mean(), num_blocks), variance))
    }

    /// Normalized statistic.
    pub fn compute_statistic(&mut self) -> Result<f64> {
        Ok(self.compute_statistic_variance()?.0)
    }

    /// Variance of the statistic.
    pub fn compute_variance(&mut self) -> Result<f64> {
        Ok(self.compute_statistic_variance()?.1)
    }

    /// Draw `num_null_samples` statistics from the permutation null.
    ///
    /// Each kernel matrix is computed once per block and permuted
    /// `num_null_samples` times. Null sample `r` permutes in seeding round
    /// `r + 1`; round 0 belongs to the permutation variance.
    pub fn sample_null(&mut self) -> Result<Vec<f64>> {
        let kernel = self.active_kernel()?;
        let n = self.config.num_null_samples;
        if n == 0 {
            return Err(Error::Config("num_null_samples must be positive".to_string()));
        }
        let (bx, by) = self.blocksizes();
        let jobs = EstimatorJobs::new(self.config.statistic_type, bx, by)?;

        let mut cm = self.manager();
        cm.enqueue_job(jobs.permutation_job());

        let mut null = vec![RunningMean::new(); n];
        let cpu = self.cpu.clone();

        drive(&mut self.source, |burst| {
            let blocks = merge_samples(&cpu, &burst, bx, by)?;
            cm.set_data(compute_kernel(&cpu, &blocks, &kernel)?, null[0].count());
            for (slot, acc) in null.iter_mut().enumerate() {
                cm.set_round(slot as u64 + 1).compute_data_parallel_jobs()?;
                for &x in cm.result(0)? {
                    acc.push(x as f64);
                }
            }
            Ok(())
        })?;
        cm.done();

        if null[0].count() == 0 {
            return Err(Error::Stream("data source produced no blocks".to_string()));
        }
        log::debug!("sampled {n} null statistics over {} blocks", null[0].count());
        Ok(null.iter().map(|acc| normalize_statistic(acc.mean(), acc.count())).collect())
    }

    /// Statistic per candidate kernel plus the covariance matrix `Q` of their
    /// paired block differences.
    ///
    /// Bursts must carry an even number of blocks: consecutive blocks
    /// `(2m, 2m + 1)` form the pairs entering `Q`.
    pub fn compute_statistic_and_q(&mut self) -> Result<(Vec<f64>, DMatrix<f64>)> {
        if self.candidates.is_empty() {
            return Err(Error::Config("no candidate kernels were added".to_string()));
        }
        let kernels = self.candidates.current();
        let k = kernels.len();
        let (bx, by) = self.blocksizes();
        let jobs = EstimatorJobs::new(self.config.statistic_type, bx, by)?;

        let mut cm = self.manager();
        cm.enqueue_job(jobs.statistic_job());

        let mut stats = vec![RunningMean::new(); k];
        let mut q = vec![RunningMean::new(); k * (k + 1) / 2];
        let cpu = self.cpu.clone();

        drive(&mut self.source, |burst| {
            let num_blocks = burst.num_blocks();
            if num_blocks % 2 != 0 {
                return Err(Error::Config(format!(
                    "the number of blocks per burst must be even, got {num_blocks}"
                )));
            }
            let blocks = merge_samples(&cpu, &burst, bx, by)?;
            let mut per_kernel: Vec<Vec<f64>> = Vec::with_capacity(k);
            let first_block = stats[0].count();
            for (kernel, acc) in kernels.iter().zip(stats.iter_mut()) {
                cm.set_data(compute_kernel(&cpu, &blocks, kernel)?, first_block);
                cm.compute_data_parallel_jobs()?;
                let mmd: Vec<f64> = cm.result(0)?.iter().map(|&x| x as f64).collect();
                for &x in &mmd {
                    acc.push(x);
                }
                per_kernel.push(mmd);
            }
            for i in 0..k {
                for j in 0..=i {
                    let acc = &mut q[lower_index(i, j)];
                    for pair in 0..num_blocks / 2 {
                        let di = per_kernel[i][2 * pair] - per_kernel[i][2 * pair + 1];
                        let dj = per_kernel[j][2 * pair] - per_kernel[j][2 * pair + 1];
                        acc.push(di * dj);
                    }
                }
            }
            Ok(())
        })?;
        cm.done();

        if stats[0].count() == 0 {
            return Err(Error::Stream("data source produced no blocks".to_string()));
        }
        let statistic = stats.iter().map(|acc| normalize_statistic(acc.mean(), acc.count())).collect();
        let q = DMatrix::from_fn(k, k, |i, j| {
            let (a, b) = if i >= j { (i, j) } else { (j, i) };
            q[lower_index(a, b)].mean()
        });
        Ok((statistic, q))
    }

    /// All-pairs Euclidean distances over the first P and Q samples.
    ///
    /// The source is read non-blockwise for this call only.
    pub fn compute_distance(&mut self) -> Result<DMatrix<f32>> {
        let blockwise = self.source.is_blockwise();
        self.source.set_blockwise(false);
        let merged = self.first_merged_block();
        self.source.set_blockwise(blockwise);
        euclidean_distance_matrix(&merged?)
    }

    fn first_merged_block(&mut self) -> Result<DenseFeatures> {
        self.source.start()?;
        let burst = self.source.next_burst();
        self.source.end();
        let burst = burst?
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::Stream("Could not fetch samples".to_string()))?;
        if burst.p[0].num_vectors() + burst.q[0].num_vectors() == 0 {
            return Err(Error::Stream("Could not fetch samples".to_string()));
        }
        merge(&burst.p[0], &burst.q[0])
    }

    // --- kernel selection ---

    /// Choose a kernel from the candidates and commit it as the active kernel.
    ///
    /// `train_test_ratio` splits the data for the duration of the call;
    /// `num_runs` and `alpha` are only used by
    /// [`KernelSelectionMethod::MaximizeXValidation`]. The previous split ratio
    /// is restored afterwards, except for the median heuristic, which leaves
    /// the split disabled and resets the source.
    pub fn select_kernel(
        &mut self,
        method: KernelSelectionMethod,
        weighted: bool,
        train_test_ratio: f64,
        num_runs: usize,
        alpha: f64,
    ) -> Result<Arc<dyn Kernel>> {
        if weighted && !method.supports_weighted() {
            return Err(Error::Config(format!("weighted kernel selection is not supported by {method}")));
        }
        if self.candidates.is_empty() {
            return Err(Error::Config("no candidate kernels were added".to_string()));
        }
        if !(train_test_ratio.is_finite() && train_test_ratio >= 0.0) {
            return Err(Error::Config(format!("train/test ratio must be >= 0, got {train_test_ratio}")));
        }
        let policy: Box<dyn KernelSelection<S>> = match method {
            KernelSelectionMethod::MedianHeuristic => Box::new(MedianHeuristic),
            KernelSelectionMethod::MaximizeMmd => Box::new(MaxMeasure::new(weighted)),
            KernelSelectionMethod::MaximizePower => Box::new(MaxTestPower::new(weighted)),
            KernelSelectionMethod::MaximizeXValidation => Box::new(MaxXValidation::new(num_runs, alpha)?),
        };
        log::debug!(
            "selecting among {} kernels with {method} (weighted={weighted}, ratio={train_test_ratio})",
            self.candidates.len()
        );

        let previous_ratio = self.source.train_test_ratio();
        self.source.set_train_test_ratio(train_test_ratio);
        self.source.set_train_mode(true);

        let outcome = policy.select_kernel(self);

        if method == KernelSelectionMethod::MedianHeuristic && outcome.is_ok() {
            self.source.set_train_test_ratio(0.0);
            self.source.reset();
        } else {
            self.source.set_train_test_ratio(previous_ratio);
        }
        self.candidates.restore_all();
        self.source.set_train_mode(false);

        let chosen = outcome?;
        self.set_kernel(chosen.clone());
        log::debug!("selected kernel {}", chosen.name());
        Ok(chosen)
    }
}
