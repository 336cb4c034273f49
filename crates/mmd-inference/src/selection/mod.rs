//! Kernel selection policies.
//!
//! Every policy receives the estimator with the data split already configured
//! (train mode on) and returns the chosen kernel. Candidates are tried through
//! the active slot's trial overlay, so a failing policy never leaves a
//! half-committed kernel behind.

mod max_measure;
mod max_power;
mod median;
mod qp;
mod xvalidation;

pub use max_measure::MaxMeasure;
pub use max_power::MaxTestPower;
pub use median::MedianHeuristic;
pub use qp::solve_weights;
pub use xvalidation::MaxXValidation;

use crate::streaming::StreamingMmd;
use mmd_core::{DataSource, Error, Kernel, Result};
use std::sync::Arc;

/// A kernel selection policy.
pub trait KernelSelection<S: DataSource> {
    /// Pick a kernel from `mmd`'s candidates.
    fn select_kernel(&self, mmd: &mut StreamingMmd<S>) -> Result<Arc<dyn Kernel>>;
}

/// Candidate with the largest finite measure (first one on ties).
pub(crate) fn argmax(kernels: &[Arc<dyn Kernel>], measures: &[f64]) -> Result<Arc<dyn Kernel>> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &m) in measures.iter().enumerate() {
        if !m.is_finite() {
            continue;
        }
        if best.is_none_or(|(_, b)| m > b) {
            best = Some((i, m));
        }
    }
    best.map(|(i, _)| kernels[i].clone())
        .ok_or_else(|| Error::Computation("no candidate kernel produced a finite measure".to_string()))
}
