//! Core traits for MMDStream
//!
//! The streaming estimator in mmd-inference only sees these seams: where
//! blocks come from (`DataSource`), how a block turns into a Gram matrix
//! (`Kernel`), and where per-block jobs are executed (`JobBackend`).
//! Concrete implementations live in mmd-compute and mmd-inference.

use crate::{Burst, DenseFeatures, GramMatrix, Result};
use std::sync::Arc;

/// Per-block numeric transformation: Gram matrix (+ per-item seed) to scalar.
///
/// The seed is supplied by the dispatcher so that randomized jobs (within-block
/// permutations) are reproducible regardless of thread scheduling.
pub type Job = Arc<dyn Fn(&GramMatrix, u64) -> f32 + Send + Sync>;

/// Streaming source of paired (P, Q) blocks.
pub trait DataSource: Send {
    /// Open the stream (rewinds to the first block).
    fn start(&mut self) -> Result<()>;

    /// Next burst, or `None` once the stream is exhausted.
    ///
    /// An empty burst also ends the stream; nothing after it is read.
    fn next_burst(&mut self) -> Result<Option<Burst>>;

    /// Close the stream.
    fn end(&mut self);

    /// Reset stream state (cursor and split bookkeeping).
    fn reset(&mut self);

    /// Block size for source `index` (0 = P, 1 = Q) in the current mode.
    fn blocksize(&self, index: usize) -> usize;

    /// Number of samples for source `index` in the current mode.
    fn num_samples(&self, index: usize) -> usize;

    /// Train/test ratio (`n_train / n_test`); 0 disables the split.
    fn set_train_test_ratio(&mut self, ratio: f64);

    /// Current train/test ratio.
    fn train_test_ratio(&self) -> f64;

    /// Serve the training (`true`) or test (`false`) portion when a split is active.
    fn set_train_mode(&mut self, train: bool);

    /// Whether the training portion is served.
    fn is_train_mode(&self) -> bool;

    /// Whether samples are delivered in blocks (otherwise one block holding everything).
    fn is_blockwise(&self) -> bool;

    /// Toggle blockwise delivery.
    fn set_blockwise(&mut self, blockwise: bool);

    /// Reassign samples to train/test portions. Sources without a notion of
    /// shuffling may ignore this.
    fn shuffle(&mut self, _seed: u64) {}

    /// Undo [`DataSource::shuffle`], restoring the original sample order.
    fn unshuffle(&mut self) {}
}

/// Kernel function evaluated over a merged block.
pub trait Kernel: Send + Sync {
    /// Full Gram matrix `K[i, j] = k(x_i, x_j)` over `features`.
    fn kernel_matrix(&self, features: &DenseFeatures) -> Result<GramMatrix>;

    /// Human-readable name, e.g. `gaussian(width=2)`.
    fn name(&self) -> String;

    /// True for kernels that only carry a precomputed matrix and cannot be
    /// evaluated on new features.
    fn is_precomputed(&self) -> bool {
        false
    }

    /// Gaussian width (`k = exp(-||x-y||^2 / width)`), if the kernel has one.
    fn width(&self) -> Option<f64> {
        None
    }
}

/// Execution backend for data-parallel jobs (CPU thread pool, GPU).
pub trait JobBackend: Send + Sync {
    /// Run every job over every matrix.
    ///
    /// Returns `results[job][item]`. `data[i]` is block `first_block + i` of
    /// the stream; backends seed it with
    /// `item_seed(seed, round, first_block + i)`.
    fn run(
        &self,
        jobs: &[Job],
        data: &[GramMatrix],
        seed: u64,
        round: u64,
        first_block: usize,
    ) -> Result<Vec<Vec<f32>>>;

    /// Backend name (e.g., "CPU", "CUDA")
    fn name(&self) -> &str;
}

/// Derive the seed of stream block `block` in round `round`.
///
/// SplitMix64 finalizer over the combined counters, so neighbouring blocks and
/// rounds get decorrelated streams. Keyed on the global block index, the seed
/// does not depend on how blocks are grouped into bursts.
#[inline]
pub fn item_seed(seed: u64, round: u64, block: usize) -> u64 {
    let mut z = seed
        .wrapping_add(round.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add((block as u64).wrapping_mul(0xD1B5_4A32_D192_ED03));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyBackend;

    impl JobBackend for DummyBackend {
        fn run(
            &self,
            jobs: &[Job],
            data: &[GramMatrix],
            seed: u64,
            round: u64,
            first_block: usize,
        ) -> Result<Vec<Vec<f32>>> {
            Ok(jobs
                .iter()
                .map(|job| {
                    data.iter()
                        .enumerate()
                        .map(|(i, m)| job(m, item_seed(seed, round, first_block + i)))
                        .collect()
                })
                .collect())
        }

        fn name(&self) -> &str {
            "Dummy"
        }
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend;
        assert_eq!(backend.name(), "Dummy");
        let trace: Job = Arc::new(|m: &GramMatrix, _| m.trace());
        let data = vec![GramMatrix::identity(3, 3), GramMatrix::identity(2, 2)];
        let out = backend.run(&[trace], &data, 0, 0, 0).unwrap();
        assert_eq!(out, vec![vec![3.0, 2.0]]);
    }

    #[test]
    fn test_item_seed_distinct() {
        let a = item_seed(7, 0, 0);
        let b = item_seed(7, 0, 1);
        let c = item_seed(7, 1, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, item_seed(7, 0, 0));
    }
}
