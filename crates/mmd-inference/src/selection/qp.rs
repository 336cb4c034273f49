//! Non-negative kernel weights from the statistic vector.
//!
//! Solves `min w' A w` subject to `h' w = 1`, `w >= 0` by projected gradient
//! descent, then rescales `w` to sum to one.

use mmd_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

const MAX_ITERATIONS: usize = 10_000;
const TOLERANCE: f64 = 1e-12;

/// `sum_i h_i max(0, v_i + tau h_i)`, nondecreasing in `tau`.
fn constraint_value(v: &DVector<f64>, h: &DVector<f64>, tau: f64) -> f64 {
    v.iter().zip(h.iter()).map(|(&vi, &hi)| hi * (vi + tau * hi).max(0.0)).sum()
}

/// Euclidean projection of `v` onto `{w >= 0, h' w = 1}`.
fn project(v: &DVector<f64>, h: &DVector<f64>) -> DVector<f64> {
    let mut upper = 1.0;
    while constraint_value(v, h, upper) < 1.0 && upper < 1e300 {
        upper *= 2.0;
    }
    let mut lower = -1.0;
    while constraint_value(v, h, lower) > 1.0 && lower > -1e300 {
        lower *= 2.0;
    }
    for _ in 0..200 {
        let mid = 0.5 * (lower + upper);
        if constraint_value(v, h, mid) < 1.0 {
            lower = mid;
        } else {
            upper = mid;
        }
    }
    let tau = upper;
    DVector::from_iterator(v.len(), v.iter().zip(h.iter()).map(|(&vi, &hi)| (vi + tau * hi).max(0.0)))
}

/// Combination weights for statistic vector `h` and quadratic form `a + lambda I`.
///
/// Fails with `Error::Computation` unless at least one entry of `h` is positive.
pub fn solve_weights(h: &[f64], a: &DMatrix<f64>, lambda: f64) -> Result<Vec<f64>> {
    let k = h.len();
    if a.nrows() != k || a.ncols() != k {
        return Err(Error::Computation(format!(
            "quadratic form is {}x{}, expected {k}x{k}",
            a.nrows(),
            a.ncols()
        )));
    }
    let (best, h_max) = h
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| Error::Computation("empty statistic vector".to_string()))?;
    if !(h_max > 0.0) {
        return Err(Error::Computation(
            "no candidate kernel has a positive statistic, cannot learn weights".to_string(),
        ));
    }

    let hv = DVector::from_column_slice(h);
    let mut q = a.clone();
    for i in 0..k {
        q[(i, i)] += lambda;
    }
    // Gershgorin bound on the largest eigenvalue of 2Q.
    let lipschitz = 2.0 * q.row_iter().map(|r| r.iter().map(|x| x.abs()).sum::<f64>()).fold(0.0, f64::max);

    let mut w = DVector::zeros(k);
    w[best] = 1.0 / h_max;
    if lipschitz > 0.0 {
        let step = 1.0 / lipschitz;
        for iteration in 0..MAX_ITERATIONS {
            let grad = &q * &w * 2.0;
            let next = project(&(&w - grad * step), &hv);
            let change = (&next - &w).amax();
            w = next;
            if change < TOLERANCE {
                log::debug!("weight QP converged after {} iterations", iteration + 1);
                break;
            }
        }
    }

    let total: f64 = w.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return Err(Error::Computation(format!("degenerate kernel weights (sum {total})")));
    }
    Ok(w.iter().map(|x| x / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_gives_positive_part_of_h() {
        let w = solve_weights(&[1.0, 2.0, -1.0], &DMatrix::identity(3, 3), 0.0).unwrap();
        assert_relative_eq!(w[0], 1.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(w[1], 2.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(w[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_diagonal_q_downweights_noisy_kernel() {
        let q = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 9.0]));
        let w = solve_weights(&[1.0, 1.0], &q, 1e-5).unwrap();
        // Optimum is proportional to Q^{-1} h.
        assert_relative_eq!(w[0], 0.9, epsilon = 1e-4);
        assert_relative_eq!(w[1], 0.1, epsilon = 1e-4);
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_requires_positive_statistic() {
        assert!(solve_weights(&[-1.0, 0.0], &DMatrix::identity(2, 2), 0.0).is_err());
        assert!(solve_weights(&[1.0], &DMatrix::identity(2, 2), 0.0).is_err());
    }

    #[test]
    fn test_projection_is_feasible() {
        let h = DVector::from_vec(vec![0.5, 1.5, -0.2]);
        let w = project(&DVector::from_vec(vec![3.0, -1.0, 2.0]), &h);
        assert!(w.iter().all(|&x| x >= 0.0));
        assert_relative_eq!(h.dot(&w), 1.0, epsilon = 1e-9);
    }
}
