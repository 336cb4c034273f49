//! Maximize the MMD statistic.

use super::{KernelSelection, argmax, solve_weights};
use crate::streaming::StreamingMmd;
use mmd_compute::CombinedKernel;
use mmd_core::{DataSource, Kernel, Result};
use nalgebra::DMatrix;
use std::sync::Arc;

/// Candidate (or convex combination) with the largest statistic.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxMeasure {
    weighted: bool,
}

impl MaxMeasure {
    /// Unweighted picks one candidate; weighted learns combination weights.
    pub fn new(weighted: bool) -> Self {
        Self { weighted }
    }
}

impl<S: DataSource> KernelSelection<S> for MaxMeasure {
    fn select_kernel(&self, mmd: &mut StreamingMmd<S>) -> Result<Arc<dyn Kernel>> {
        let kernels = mmd.candidate_kernels();
        if self.weighted {
            let (h, _) = mmd.compute_statistic_and_q()?;
            let k = h.len();
            let weights = solve_weights(&h, &DMatrix::identity(k, k), 0.0)?;
            return Ok(Arc::new(CombinedKernel::new(kernels, weights)?));
        }
        let mut measures = Vec::with_capacity(kernels.len());
        for kernel in &kernels {
            let stat = mmd.with_trial_kernel(kernel.clone(), |m| m.compute_statistic())?;
            log::debug!("{}: statistic {stat:.6e}", kernel.name());
            measures.push(stat);
        }
        argmax(&kernels, &measures)
    }
}
