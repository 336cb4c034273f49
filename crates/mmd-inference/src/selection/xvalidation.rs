//! Maximize the held-out rejection rate.

use super::{KernelSelection, argmax};
use crate::streaming::StreamingMmd;
use mmd_core::{DataSource, Error, Kernel, Result};
use std::sync::Arc;

/// Repeats `num_runs` times: reshuffle the source, then test every candidate
/// on the held-out portion at level `alpha`. Picks the kernel that rejects
/// most often. The source order is restored after every run.
#[derive(Debug, Clone, Copy)]
pub struct MaxXValidation {
    num_runs: usize,
    alpha: f64,
}

impl MaxXValidation {
    /// `num_runs > 0`, `alpha` in `(0, 1)`.
    pub fn new(num_runs: usize, alpha: f64) -> Result<Self> {
        if num_runs == 0 {
            return Err(Error::Config("num_runs must be positive".to_string()));
        }
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(Error::Config(format!("alpha must be in (0, 1), got {alpha}")));
        }
        Ok(Self { num_runs, alpha })
    }
}

impl MaxXValidation {
    /// Test every kernel once on the held-out portion; `true` where it rejects.
    fn held_out_rejections<S: DataSource>(
        &self,
        mmd: &mut StreamingMmd<S>,
        kernels: &[Arc<dyn Kernel>],
    ) -> Result<Vec<bool>> {
        kernels
            .iter()
            .map(|kernel| {
                let p_value = mmd.with_trial_kernel(kernel.clone(), |m| {
                    let stat = m.compute_statistic()?;
                    m.compute_p_value(stat)
                })?;
                Ok(p_value < self.alpha)
            })
            .collect()
    }
}

impl<S: DataSource> KernelSelection<S> for MaxXValidation {
    fn select_kernel(&self, mmd: &mut StreamingMmd<S>) -> Result<Arc<dyn Kernel>> {
        let kernels = mmd.candidate_kernels();
        let mut rejections = vec![0usize; kernels.len()];
        let seed = mmd.seed();

        for run in 0..self.num_runs {
            mmd.data_source_mut().shuffle(seed.wrapping_add(run as u64));
            mmd.data_source_mut().set_train_mode(false);
            let outcome = self.held_out_rejections(mmd, &kernels);
            mmd.data_source_mut().unshuffle();
            mmd.data_source_mut().set_train_mode(true);
            for (count, rejected) in rejections.iter_mut().zip(outcome?) {
                if rejected {
                    *count += 1;
                }
            }
        }

        let rates: Vec<f64> = rejections.iter().map(|&r| r as f64 / self.num_runs as f64).collect();
        log::debug!("rejection rates {rates:?}");
        argmax(&kernels, &rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_validated() {
        assert!(MaxXValidation::new(0, 0.05).is_err());
        assert!(MaxXValidation::new(3, 0.0).is_err());
        assert!(MaxXValidation::new(3, 1.0).is_err());
        assert!(MaxXValidation::new(3, 0.05).is_ok());
    }
}
