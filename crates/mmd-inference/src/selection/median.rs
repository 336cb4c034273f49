//! Median heuristic over Gaussian widths.

use super::KernelSelection;
use crate::streaming::StreamingMmd;
use mmd_compute::distance::upper_triangle;
use mmd_core::{DataSource, Error, Kernel, Result};
use std::sync::Arc;

/// Picks the Gaussian width closest to the squared median pairwise distance
/// of the pooled samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct MedianHeuristic;

impl<S: DataSource> KernelSelection<S> for MedianHeuristic {
    fn select_kernel(&self, mmd: &mut StreamingMmd<S>) -> Result<Arc<dyn Kernel>> {
        let kernels = mmd.candidate_kernels();
        let widths = kernels
            .iter()
            .map(|k| {
                k.width().ok_or_else(|| {
                    Error::Config(format!("median heuristic needs Gaussian kernels, got {}", k.name()))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        let distances = mmd.compute_distance()?;
        let mut upper = upper_triangle(&distances);
        if upper.is_empty() {
            return Err(Error::Stream("need at least two samples for the median heuristic".to_string()));
        }
        upper.sort_by(|a, b| a.total_cmp(b));
        let median = upper[upper.len() / 2] as f64;
        let target = median * median;
        log::debug!("median pairwise distance {median:.6}, target width {target:.6}");

        let (best, _) = widths
            .iter()
            .enumerate()
            .map(|(i, w)| (i, (w - target).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| Error::Config("no candidate kernels were added".to_string()))?;
        Ok(kernels[best].clone())
    }
}
