//! Common data types for MMDStream

use crate::{Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Square kernel (Gram) matrix over one merged block.
///
/// Kept in `f32`: kernel matrices dominate memory per burst and the estimators
/// accumulate in `f64` afterwards.
pub type GramMatrix = DMatrix<f32>;

/// Dense feature block: one sample per row.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseFeatures {
    data: DMatrix<f64>,
}

impl DenseFeatures {
    /// Wrap a `n_samples x dim` matrix.
    pub fn new(data: DMatrix<f64>) -> Self {
        Self { data }
    }

    /// Build from row vectors. All rows must have the same dimension.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(Error::Config(format!(
                "row {i} has dimension {}, expected {dim}",
                r.len()
            )));
        }
        Ok(Self { data: DMatrix::from_fn(rows.len(), dim, |i, j| rows[i][j]) })
    }

    /// Number of samples (rows).
    pub fn num_vectors(&self) -> usize {
        self.data.nrows()
    }

    /// Feature dimension (columns).
    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    /// Underlying matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Squared Euclidean distance between rows `i` and `j`.
    #[inline]
    pub fn sq_distance(&self, i: usize, j: usize) -> f64 {
        let mut acc = 0.0;
        for c in 0..self.data.ncols() {
            let d = self.data[(i, c)] - self.data[(j, c)];
            acc += d * d;
        }
        acc
    }

    /// Dot product between rows `i` and `j`.
    #[inline]
    pub fn dot(&self, i: usize, j: usize) -> f64 {
        let mut acc = 0.0;
        for c in 0..self.data.ncols() {
            acc += self.data[(i, c)] * self.data[(j, c)];
        }
        acc
    }

    /// Copy of the rows selected by `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self { data: self.data.select_rows(indices) }
    }
}

/// One delivery unit of the stream: paired P and Q blocks.
///
/// `p[i]` is paired with `q[i]`.
#[derive(Debug, Clone, Default)]
pub struct Burst {
    /// Blocks drawn from P.
    pub p: Vec<DenseFeatures>,
    /// Blocks drawn from Q.
    pub q: Vec<DenseFeatures>,
}

impl Burst {
    /// Create a burst from paired block lists.
    pub fn new(p: Vec<DenseFeatures>, q: Vec<DenseFeatures>) -> Result<Self> {
        if p.len() != q.len() {
            return Err(Error::Stream(format!(
                "unpaired burst: {} P blocks vs {} Q blocks",
                p.len(),
                q.len()
            )));
        }
        Ok(Self { p, q })
    }

    /// Number of paired blocks.
    pub fn num_blocks(&self) -> usize {
        self.p.len()
    }

    /// True if the burst carries no blocks.
    pub fn is_empty(&self) -> bool {
        self.p.is_empty()
    }
}

macro_rules! named_enum {
    ($ty:ident, $what:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Stable lowercase name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(Error::Config(format!(
                        concat!("unsupported ", $what, " '{}' (expected one of: {})"),
                        other,
                        [$($name),+].join(", ")
                    ))),
                }
            }
        }
    };
}

/// MMD estimator formula applied within each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticType {
    /// U-statistic: within-sample diagonals excluded, full cross term.
    #[default]
    UnbiasedFull,
    /// Incomplete U-statistic over paired indices; requires equal block sizes.
    UnbiasedIncomplete,
    /// V-statistic: all terms included.
    BiasedFull,
}

named_enum!(StatisticType, "statistic type", {
    UnbiasedFull => "unbiased_full",
    UnbiasedIncomplete => "unbiased_incomplete",
    BiasedFull => "biased_full",
});

/// How the variance of the statistic is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceEstimationMethod {
    /// Closed-form within-block estimate, averaged over blocks.
    #[default]
    Direct,
    /// Spread of within-block permuted statistics.
    Permutation,
}

named_enum!(VarianceEstimationMethod, "variance estimation method", {
    Direct => "direct",
    Permutation => "permutation",
});

/// How the null distribution is approximated for p-values and thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullApproximationMethod {
    /// Empirical null from repeated within-block permutations.
    #[default]
    Permutation,
    /// Gaussian null with the estimated variance.
    Mmd1Gaussian,
}

named_enum!(NullApproximationMethod, "null approximation method", {
    Permutation => "permutation",
    Mmd1Gaussian => "mmd1_gaussian",
});

/// Kernel selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelSelectionMethod {
    /// Gaussian width closest to the median pairwise distance.
    MedianHeuristic,
    /// Highest held-out rejection rate over repeated runs.
    MaximizeXValidation,
    /// Largest MMD statistic.
    MaximizeMmd,
    /// Largest statistic / standard deviation ratio.
    MaximizePower,
}

named_enum!(KernelSelectionMethod, "kernel selection method", {
    MedianHeuristic => "median_heuristic",
    MaximizeXValidation => "maximize_xvalidation",
    MaximizeMmd => "maximize_mmd",
    MaximizePower => "maximize_power",
});

impl KernelSelectionMethod {
    /// Whether a weighted kernel combination can be learned with this method.
    pub fn supports_weighted(&self) -> bool {
        matches!(self, Self::MaximizeMmd | Self::MaximizePower)
    }
}
