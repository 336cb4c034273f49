//! Maximize the test power proxy `statistic / sqrt(variance)`.

use super::{KernelSelection, argmax, solve_weights};
use crate::streaming::StreamingMmd;
use mmd_compute::CombinedKernel;
use mmd_core::{DataSource, Error, Kernel, Result};
use std::sync::Arc;

/// Ridge added to `Q` before solving for combination weights.
const Q_REGULARIZATION: f64 = 1e-5;

/// Candidate (or combination) maximizing the statistic-to-deviation ratio.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxTestPower {
    weighted: bool,
}

impl MaxTestPower {
    /// Unweighted picks one candidate; weighted learns combination weights.
    pub fn new(weighted: bool) -> Self {
        Self { weighted }
    }
}

impl<S: DataSource> KernelSelection<S> for MaxTestPower {
    fn select_kernel(&self, mmd: &mut StreamingMmd<S>) -> Result<Arc<dyn Kernel>> {
        let kernels = mmd.candidate_kernels();
        if self.weighted {
            let (h, q) = mmd.compute_statistic_and_q()?;
            let weights = solve_weights(&h, &q, Q_REGULARIZATION)?;
            return Ok(Arc::new(CombinedKernel::new(kernels, weights)?));
        }

        let mut measures = Vec::with_capacity(kernels.len());
        for kernel in &kernels {
            let (stat, var) = mmd.with_trial_kernel(kernel.clone(), |m| m.compute_statistic_variance())?;
            if var <= 0.0 || !var.is_finite() {
                log::warn!("{}: variance {var:.3e} is not positive, skipping", kernel.name());
                measures.push(f64::NAN);
                continue;
            }
            let ratio = stat / var.sqrt();
            log::debug!("{}: statistic {stat:.6e}, variance {var:.6e}, ratio {ratio:.6}", kernel.name());
            measures.push(ratio);
        }
        if measures.iter().all(|m| m.is_nan()) {
            return Err(Error::Computation(
                "every candidate kernel has a non-positive variance estimate".to_string(),
            ));
        }
        argmax(&kernels, &measures)
    }
}
