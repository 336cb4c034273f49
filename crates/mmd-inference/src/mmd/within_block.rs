//! Within-block variance estimators: closed form and permutation.

use super::{BlockSums, statistic_from_sums};
use mmd_core::{GramMatrix, StatisticType};
use rand::SeedableRng;
use rand::seq::SliceRandom;

/// Direct variance estimate of the incomplete block statistic (`n == m`).
///
/// With `h(i, j) = Kxx[i,j] + Kyy[i,j] - Kxy[i,j] - Kxy[j,i]` over ordered
/// pairs `i != j`, returns `2 / (n(n-1)) * (mean(h^2) - mean(h)^2)`.
pub fn within_block_direct(km: &GramMatrix, n: usize) -> f64 {
    let k = |i: usize, j: usize| km[(i, j)] as f64;
    let mut sum_h = 0.0;
    let mut sum_h2 = 0.0;
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let h = k(i, j) + k(n + i, n + j) - k(i, n + j) - k(j, n + i);
            sum_h += h;
            sum_h2 += h * h;
        }
    }
    let pairs = (n * (n - 1)) as f64;
    let mean_h = sum_h / pairs;
    let mean_h2 = sum_h2 / pairs;
    2.0 / pairs * (mean_h2 - mean_h * mean_h)
}

/// Statistic recomputed after randomly relabelling all `n + m` samples.
///
/// The permutation is drawn from `seed`, so the same seed always yields the
/// same relabelling.
pub fn permuted_statistic(stype: StatisticType, km: &GramMatrix, n: usize, seed: u64) -> f64 {
    let total = km.nrows();
    let m = total - n;
    let mut perm: Vec<usize> = (0..total).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    perm.shuffle(&mut rng);
    let sums = BlockSums::accumulate(|i, j| km[(perm[i], perm[j])] as f64, n, m);
    statistic_from_sums(stype, &sums, n, m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmd::block_statistic;
    use approx::assert_relative_eq;

    fn gaussian_gram(points: &[f64], width: f64) -> GramMatrix {
        let n = points.len();
        GramMatrix::from_fn(n, n, |i, j| {
            let d = points[i] - points[j];
            (-(d * d) / width).exp() as f32
        })
    }

    #[test]
    fn test_direct_variance_non_negative_and_zero_for_constant_h() {
        let km = gaussian_gram(&[0.0, 0.4, 1.1, 2.0, 0.1, 0.7, 1.5, 2.2], 1.0);
        assert!(within_block_direct(&km, 4) >= 0.0);

        // All-ones Gram matrix makes h identically zero.
        let ones = GramMatrix::from_element(6, 6, 1.0);
        assert_relative_eq!(within_block_direct(&ones, 3), 0.0);
    }

    #[test]
    fn test_permutation_is_seeded() {
        let km = gaussian_gram(&[0.0, 0.1, 0.2, 0.3, 5.0, 5.1, 5.2, 5.3], 1.0);
        let a = permuted_statistic(StatisticType::UnbiasedFull, &km, 4, 9);
        let b = permuted_statistic(StatisticType::UnbiasedFull, &km, 4, 9);
        assert_eq!(a, b);

        // Relabelling well-separated samples must shrink the statistic on average.
        let observed = block_statistic(StatisticType::UnbiasedFull, &km, 4);
        let mean_perm: f64 = (0..200)
            .map(|s| permuted_statistic(StatisticType::UnbiasedFull, &km, 4, s))
            .sum::<f64>()
            / 200.0;
        assert!(mean_perm < observed, "permuted mean {mean_perm} vs observed {observed}");
    }

    #[test]
    fn test_partition_preserving_permutation_keeps_statistic() {
        // A third of all relabellings of 4 points keep the {P, Q} partition.
        let km = gaussian_gram(&[0.0, 1.0, 2.0, 3.0], 2.0);
        let observed = block_statistic(StatisticType::BiasedFull, &km, 2);
        let values: Vec<f64> =
            (0..50).map(|s| permuted_statistic(StatisticType::BiasedFull, &km, 2, s)).collect();
        assert!(values.iter().any(|v| (v - observed).abs() < 1e-9));
    }
}
