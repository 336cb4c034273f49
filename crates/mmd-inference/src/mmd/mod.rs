//! Within-block MMD estimators.
//!
//! A merged block has `n` P samples followed by `m` Q samples, so its Gram
//! matrix splits into
//!
//! ```text
//!        P        Q
//!   P [ Kxx  |  Kxy ]
//!   Q [ Kyx  |  Kyy ]
//! ```
//!
//! All estimators are written against an index accessor `k(i, j)` so the
//! permutation estimator can reuse them on a relabelled matrix without copying.

mod within_block;

pub use within_block::{permuted_statistic, within_block_direct};

use mmd_core::{GramMatrix, StatisticType};

/// Sub-block sums needed by every estimator variant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct BlockSums {
    pub xx: f64,
    pub xx_diag: f64,
    pub yy: f64,
    pub yy_diag: f64,
    pub xy: f64,
    /// `sum_i Kxy[i, i]` over `i < min(n, m)`.
    pub xy_diag: f64,
}

impl BlockSums {
    pub(crate) fn accumulate<K>(k: K, n: usize, m: usize) -> Self
    where
        K: Fn(usize, usize) -> f64,
    {
        let mut s = BlockSums::default();
        for i in 0..n {
            for j in 0..n {
                s.xx += k(i, j);
            }
            s.xx_diag += k(i, i);
        }
        for i in 0..m {
            for j in 0..m {
                s.yy += k(n + i, n + j);
            }
            s.yy_diag += k(n + i, n + i);
        }
        for i in 0..n {
            for j in 0..m {
                s.xy += k(i, n + j);
            }
            if i < m {
                s.xy_diag += k(i, n + i);
            }
        }
        s
    }
}

/// Biased (V-statistic) MMD^2: `sum Kxx/n^2 + sum Kyy/m^2 - 2 sum Kxy/(nm)`.
pub(crate) fn biased_full(s: &BlockSums, n: usize, m: usize) -> f64 {
    let (n, m) = (n as f64, m as f64);
    s.xx / (n * n) + s.yy / (m * m) - 2.0 * s.xy / (n * m)
}

/// Unbiased MMD^2 with within-sample diagonals removed.
pub(crate) fn unbiased_full(s: &BlockSums, n: usize, m: usize) -> f64 {
    let (nf, mf) = (n as f64, m as f64);
    (s.xx - s.xx_diag) / (nf * (nf - 1.0)) + (s.yy - s.yy_diag) / (mf * (mf - 1.0))
        - 2.0 * s.xy / (nf * mf)
}

/// Incomplete U-statistic over paired samples (`n == m`):
/// `sum_{i != j} h(i, j) / (n(n-1))` with `h = Kxx + Kyy - Kxy - Kyx`.
pub(crate) fn unbiased_incomplete(s: &BlockSums, n: usize) -> f64 {
    let nf = n as f64;
    ((s.xx - s.xx_diag) + (s.yy - s.yy_diag) - 2.0 * (s.xy - s.xy_diag)) / (nf * (nf - 1.0))
}

pub(crate) fn statistic_from_sums(stype: StatisticType, s: &BlockSums, n: usize, m: usize) -> f64 {
    match stype {
        StatisticType::BiasedFull => biased_full(s, n, m),
        StatisticType::UnbiasedFull => unbiased_full(s, n, m),
        StatisticType::UnbiasedIncomplete => unbiased_incomplete(s, n),
    }
}

/// MMD^2 estimate of `stype` over one merged block with `n` P rows.
pub fn block_statistic(stype: StatisticType, km: &GramMatrix, n: usize) -> f64 {
    let m = km.nrows() - n;
    let sums = BlockSums::accumulate(|i, j| km[(i, j)] as f64, n, m);
    statistic_from_sums(stype, &sums, n, m)
}

/// Scale the running block mean to the reported statistic.
///
/// The mean of `num_blocks` independent block estimates is rescaled by
/// `sqrt(num_blocks)` so that its spread under the null matches the per-block
/// variance reported by [`normalize_variance`].
pub fn normalize_statistic(mean: f64, num_blocks: usize) -> f64 {
    mean * (num_blocks as f64).sqrt()
}

/// Turn an accumulated `M2` over `num_blocks` permuted block statistics into
/// the per-block variance.
pub fn normalize_variance(m2: f64, num_blocks: usize) -> f64 {
    if num_blocks == 0 {
        return 0.0;
    }
    m2 / num_blocks as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Gram matrix with every entry chosen so the sub-block sums are easy to check.
    fn toy_matrix() -> GramMatrix {
        // n = 2, m = 2
        GramMatrix::from_row_slice(
            4,
            4,
            &[
                1.0, 0.5, 0.2, 0.1, //
                0.5, 1.0, 0.3, 0.2, //
                0.2, 0.3, 1.0, 0.6, //
                0.1, 0.2, 0.6, 1.0,
            ],
        )
    }

    #[test]
    fn test_block_sums() {
        let km = toy_matrix();
        let s = BlockSums::accumulate(|i, j| km[(i, j)] as f64, 2, 2);
        assert_relative_eq!(s.xx, 3.0, epsilon = 1e-6);
        assert_relative_eq!(s.xx_diag, 2.0, epsilon = 1e-6);
        assert_relative_eq!(s.yy, 3.2, epsilon = 1e-6);
        assert_relative_eq!(s.xy, 0.8, epsilon = 1e-6);
        assert_relative_eq!(s.xy_diag, 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_estimator_values() {
        let km = toy_matrix();
        let biased = block_statistic(StatisticType::BiasedFull, &km, 2);
        assert_relative_eq!(biased, 3.0 / 4.0 + 3.2 / 4.0 - 2.0 * 0.8 / 4.0, epsilon = 1e-6);

        let unbiased = block_statistic(StatisticType::UnbiasedFull, &km, 2);
        assert_relative_eq!(unbiased, 1.0 / 2.0 + 1.2 / 2.0 - 2.0 * 0.8 / 4.0, epsilon = 1e-6);

        let incomplete = block_statistic(StatisticType::UnbiasedIncomplete, &km, 2);
        assert_relative_eq!(incomplete, (1.0 + 1.2 - 2.0 * 0.4) / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_identical_samples_give_zero_biased() {
        // P and Q are the same two points.
        let km = GramMatrix::from_row_slice(
            4,
            4,
            &[
                1.0, 0.3, 1.0, 0.3, //
                0.3, 1.0, 0.3, 1.0, //
                1.0, 0.3, 1.0, 0.3, //
                0.3, 1.0, 0.3, 1.0,
            ],
        );
        assert_relative_eq!(block_statistic(StatisticType::BiasedFull, &km, 2), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_normalization() {
        assert_relative_eq!(normalize_statistic(0.5, 16), 2.0);
        assert_relative_eq!(normalize_variance(8.0, 4), 2.0);
        assert_eq!(normalize_variance(1.0, 0), 0.0);
    }
}
