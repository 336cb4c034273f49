//! Kernel implementations evaluated over merged blocks.
//!
//! Only what the two-sample test needs: Gaussian kernels (the candidates for
//! bandwidth selection), a linear kernel, weighted combinations produced by
//! kernel learning, and precomputed matrices.

use mmd_core::{DenseFeatures, Error, GramMatrix, Kernel, Result};
use std::sync::Arc;

fn symmetric_matrix<F>(n: usize, f: F) -> GramMatrix
where
    F: Fn(usize, usize) -> f64,
{
    let mut km = GramMatrix::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            let v = f(i, j) as f32;
            km[(i, j)] = v;
            km[(j, i)] = v;
        }
    }
    km
}

/// Gaussian kernel `k(x, y) = exp(-||x - y||^2 / width)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianKernel {
    width: f64,
}

impl GaussianKernel {
    /// Create with a strictly positive, finite width.
    pub fn new(width: f64) -> Result<Self> {
        if !(width.is_finite() && width > 0.0) {
            return Err(Error::Config(format!("Gaussian width must be > 0, got {width}")));
        }
        Ok(Self { width })
    }

    /// Create from a bandwidth `sigma` (`width = 2 sigma^2`).
    pub fn from_sigma(sigma: f64) -> Result<Self> {
        Self::new(2.0 * sigma * sigma)
    }
}

impl Kernel for GaussianKernel {
    fn kernel_matrix(&self, features: &DenseFeatures) -> Result<GramMatrix> {
        let w = self.width;
        Ok(symmetric_matrix(features.num_vectors(), |i, j| {
            (-features.sq_distance(i, j) / w).exp()
        }))
    }

    fn name(&self) -> String {
        format!("gaussian(width={})", self.width)
    }

    fn width(&self) -> Option<f64> {
        Some(self.width)
    }
}

/// Linear kernel `k(x, y) = <x, y>`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinearKernel;

impl Kernel for LinearKernel {
    fn kernel_matrix(&self, features: &DenseFeatures) -> Result<GramMatrix> {
        Ok(symmetric_matrix(features.num_vectors(), |i, j| features.dot(i, j)))
    }

    fn name(&self) -> String {
        "linear".to_string()
    }
}

/// Non-negative weighted sum of kernels.
#[derive(Clone)]
pub struct CombinedKernel {
    kernels: Vec<Arc<dyn Kernel>>,
    weights: Vec<f64>,
}

impl CombinedKernel {
    /// Combine `kernels` with `weights` (same length, finite, non-negative).
    pub fn new(kernels: Vec<Arc<dyn Kernel>>, weights: Vec<f64>) -> Result<Self> {
        if kernels.is_empty() || kernels.len() != weights.len() {
            return Err(Error::Config(format!(
                "combined kernel needs one weight per kernel ({} kernels, {} weights)",
                kernels.len(),
                weights.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config("combined kernel weights must be finite and >= 0".to_string()));
        }
        Ok(Self { kernels, weights })
    }

    /// Combination weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Sub-kernels.
    pub fn kernels(&self) -> &[Arc<dyn Kernel>] {
        &self.kernels
    }
}

impl Kernel for CombinedKernel {
    fn kernel_matrix(&self, features: &DenseFeatures) -> Result<GramMatrix> {
        let n = features.num_vectors();
        let mut acc = GramMatrix::zeros(n, n);
        for (kernel, &w) in self.kernels.iter().zip(&self.weights) {
            if w == 0.0 {
                continue;
            }
            acc += kernel.kernel_matrix(features)? * (w as f32);
        }
        Ok(acc)
    }

    fn name(&self) -> String {
        let parts: Vec<String> = self
            .kernels
            .iter()
            .zip(&self.weights)
            .map(|(k, w)| format!("{w:.4}*{}", k.name()))
            .collect();
        format!("combined[{}]", parts.join(" + "))
    }

    fn is_precomputed(&self) -> bool {
        self.kernels.iter().any(|k| k.is_precomputed())
    }
}

/// Precomputed Gram matrix. Cannot be evaluated on new features.
#[derive(Debug, Clone)]
pub struct CustomKernel {
    matrix: GramMatrix,
}

impl CustomKernel {
    /// Wrap a precomputed square matrix.
    pub fn new(matrix: GramMatrix) -> Result<Self> {
        if !matrix.is_square() {
            return Err(Error::Config(format!(
                "custom kernel matrix must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        Ok(Self { matrix })
    }

    /// Stored matrix.
    pub fn matrix(&self) -> &GramMatrix {
        &self.matrix
    }
}

impl Kernel for CustomKernel {
    fn kernel_matrix(&self, _features: &DenseFeatures) -> Result<GramMatrix> {
        Err(Error::Config("a precomputed (custom) kernel cannot be evaluated on new features".to_string()))
    }

    fn name(&self) -> String {
        format!("custom({}x{})", self.matrix.nrows(), self.matrix.ncols())
    }

    fn is_precomputed(&self) -> bool {
        true
    }
}
