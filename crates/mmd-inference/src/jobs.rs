//! Estimator job factory.
//!
//! Maps the configured estimator variants and the block sizes reported by the
//! data source to per-block jobs. Jobs capture the block sizes, so they are
//! rebuilt at the start of every streaming pass.

use crate::mmd::{block_statistic, permuted_statistic, within_block_direct};
use mmd_core::{Error, GramMatrix, Job, Result, StatisticType, VarianceEstimationMethod};
use std::sync::Arc;

/// Statistic and permutation jobs for one block layout.
#[derive(Clone)]
pub struct EstimatorJobs {
    statistic_type: StatisticType,
    blocksize_p: usize,
    blocksize_q: usize,
    statistic: Job,
    permutation: Job,
}

impl std::fmt::Debug for EstimatorJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstimatorJobs")
            .field("statistic_type", &self.statistic_type)
            .field("blocksize_p", &self.blocksize_p)
            .field("blocksize_q", &self.blocksize_q)
            .finish_non_exhaustive()
    }
}

fn check_layout(stype: StatisticType, bx: usize, by: usize) -> Result<()> {
    if bx == 0 || by == 0 {
        return Err(Error::Config(format!("block sizes must be positive (got {bx} and {by})")));
    }
    match stype {
        StatisticType::BiasedFull => Ok(()),
        StatisticType::UnbiasedFull if bx < 2 || by < 2 => Err(Error::Config(format!(
            "unbiased_full needs at least 2 samples per block (got {bx} and {by})"
        ))),
        StatisticType::UnbiasedFull => Ok(()),
        StatisticType::UnbiasedIncomplete if bx != by || bx < 2 => Err(Error::Config(format!(
            "unbiased_incomplete needs equal block sizes of at least 2 (got {bx} and {by})"
        ))),
        StatisticType::UnbiasedIncomplete => Ok(()),
    }
}

impl EstimatorJobs {
    /// Build the statistic and permutation jobs for blocks of `bx` P and `by` Q samples.
    pub fn new(stype: StatisticType, bx: usize, by: usize) -> Result<Self> {
        check_layout(stype, bx, by)?;
        let statistic: Job = Arc::new(move |km: &GramMatrix, _seed| block_statistic(stype, km, bx) as f32);
        let permutation: Job =
            Arc::new(move |km: &GramMatrix, seed| permuted_statistic(stype, km, bx, seed) as f32);
        Ok(Self { statistic_type: stype, blocksize_p: bx, blocksize_q: by, statistic, permutation })
    }

    /// Per-block statistic.
    pub fn statistic_job(&self) -> Job {
        self.statistic.clone()
    }

    /// Per-block statistic after a random relabelling (seeded per item).
    pub fn permutation_job(&self) -> Job {
        self.permutation.clone()
    }

    /// Per-block variance job for `method`.
    ///
    /// `Permutation` aliases [`Self::permutation_job`]; `Direct` needs equal
    /// block sizes.
    pub fn variance_job(&self, method: VarianceEstimationMethod) -> Result<Job> {
        match method {
            VarianceEstimationMethod::Permutation => Ok(self.permutation_job()),
            VarianceEstimationMethod::Direct => {
                let (bx, by) = (self.blocksize_p, self.blocksize_q);
                if bx != by || bx < 2 {
                    return Err(Error::Config(format!(
                        "direct variance estimation needs equal block sizes of at least 2 (got {bx} and {by})"
                    )));
                }
                Ok(Arc::new(move |km: &GramMatrix, _seed| within_block_direct(km, bx) as f32))
            }
        }
    }

    /// Statistic type the jobs were built for.
    pub fn statistic_type(&self) -> StatisticType {
        self.statistic_type
    }

    /// Block sizes `(P, Q)` the jobs were built for.
    pub fn blocksizes(&self) -> (usize, usize) {
        (self.blocksize_p, self.blocksize_q)
    }
}
