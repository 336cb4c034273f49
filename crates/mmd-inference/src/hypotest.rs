//! p-values, thresholds and the full two-sample test on top of the
//! streaming estimator.

use crate::streaming::StreamingMmd;
use mmd_core::{DataSource, Error, NullApproximationMethod, Result, StatisticType};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| Error::Computation(format!("standard normal: {e}")))
}

/// Upper-tail probability from counts.
fn tail_prob_counts(n_ge: usize, n_valid: usize) -> f64 {
    if n_valid == 0 {
        return 0.0;
    }
    // Add-one smoothing to avoid exact 0/1 tail-probabilities.
    (n_ge as f64 + 1.0) / (n_valid as f64 + 1.0)
}

/// Linear-interpolation quantile of sorted data.
fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let (i, j) = (pos.floor() as usize, pos.ceil() as usize);
    if i == j {
        return sorted[i];
    }
    let t = pos - i as f64;
    (1.0 - t) * sorted[i] + t * sorted[j]
}

fn check_alpha(alpha: f64) -> Result<()> {
    if !(alpha.is_finite() && alpha > 0.0 && alpha < 1.0) {
        return Err(Error::Config(format!("alpha must be in (0, 1), got {alpha}")));
    }
    Ok(())
}

fn check_variance(variance: f64) -> Result<f64> {
    if !(variance.is_finite() && variance > 0.0) {
        return Err(Error::Computation(format!(
            "Gaussian null needs a positive variance estimate, got {variance}"
        )));
    }
    Ok(variance.sqrt())
}

fn null_p_value(statistic: f64, null: &[f64]) -> f64 {
    let n_ge = null.iter().filter(|&&x| x >= statistic).count();
    tail_prob_counts(n_ge, null.len())
}

fn null_threshold(null: &[f64], alpha: f64) -> f64 {
    let mut sorted = null.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_linear_sorted(&sorted, 1.0 - alpha)
}

fn gaussian_p_value(statistic: f64, std_dev: f64) -> Result<f64> {
    Ok(1.0 - standard_normal()?.cdf(statistic / std_dev))
}

fn gaussian_threshold(std_dev: f64, alpha: f64) -> Result<f64> {
    Ok(std_dev * standard_normal()?.inverse_cdf(1.0 - alpha))
}

/// Result of [`StreamingMmd::perform_test`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Normalized MMD statistic.
    pub statistic: f64,
    /// Variance estimate.
    pub variance: f64,
    /// Upper-tail p-value of the statistic under the null.
    pub p_value: f64,
    /// Rejection threshold at `alpha`.
    pub threshold: f64,
    /// Significance level.
    pub alpha: f64,
    /// `p_value < alpha`.
    pub reject: bool,
    /// Per-block estimator.
    pub statistic_type: StatisticType,
    /// Null approximation used.
    pub null_method: NullApproximationMethod,
    /// Backend jobs ran on.
    pub backend: String,
}

impl<S: DataSource> StreamingMmd<S> {
    /// p-value of `statistic` under the configured null approximation.
    pub fn compute_p_value(&mut self, statistic: f64) -> Result<f64> {
        match self.config.null_approximation_method {
            NullApproximationMethod::Permutation => {
                let null = self.sample_null()?;
                Ok(null_p_value(statistic, &null))
            }
            NullApproximationMethod::Mmd1Gaussian => {
                let std_dev = check_variance(self.compute_variance()?)?;
                gaussian_p_value(statistic, std_dev)
            }
        }
    }

    /// Statistic value above which the null is rejected at level `alpha`.
    pub fn compute_threshold(&mut self, alpha: f64) -> Result<f64> {
        check_alpha(alpha)?;
        match self.config.null_approximation_method {
            NullApproximationMethod::Permutation => {
                let null = self.sample_null()?;
                Ok(null_threshold(&null, alpha))
            }
            NullApproximationMethod::Mmd1Gaussian => {
                let std_dev = check_variance(self.compute_variance()?)?;
                gaussian_threshold(std_dev, alpha)
            }
        }
    }

    /// Full test at level `alpha`: statistic, variance, p-value and threshold.
    pub fn perform_test(&mut self, alpha: f64) -> Result<TestOutcome> {
        check_alpha(alpha)?;
        let (statistic, variance) = self.compute_statistic_variance()?;
        let method = self.config.null_approximation_method;
        let (p_value, threshold) = match method {
            NullApproximationMethod::Permutation => {
                let null = self.sample_null()?;
                (null_p_value(statistic, &null), null_threshold(&null, alpha))
            }
            NullApproximationMethod::Mmd1Gaussian => {
                let std_dev = check_variance(variance)?;
                (gaussian_p_value(statistic, std_dev)?, gaussian_threshold(std_dev, alpha)?)
            }
        };
        log::debug!("statistic {statistic:.6e}, p-value {p_value:.4}, threshold {threshold:.6e}");
        Ok(TestOutcome {
            statistic,
            variance,
            p_value,
            threshold,
            alpha,
            reject: p_value < alpha,
            statistic_type: self.config.statistic_type,
            null_method: method,
            backend: self.backend_name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tail_prob_counts_smoothing() {
        assert_eq!(tail_prob_counts(0, 0), 0.0);
        assert_relative_eq!(tail_prob_counts(0, 99), 0.01);
        assert_relative_eq!(tail_prob_counts(99, 99), 1.0);
    }

    #[test]
    fn test_null_helpers() {
        let null: Vec<f64> = (0..101).map(|i| i as f64).collect();
        assert_relative_eq!(null_p_value(95.0, &null), 7.0 / 102.0);
        assert_relative_eq!(null_threshold(&null, 0.05), 95.0, epsilon = 1e-9);
        assert_relative_eq!(quantile_linear_sorted(&[1.0, 2.0], 0.5), 1.5);
    }

    #[test]
    fn test_gaussian_helpers() {
        assert_relative_eq!(gaussian_p_value(0.0, 1.0).unwrap(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(gaussian_p_value(1.959964, 1.0).unwrap(), 0.025, epsilon = 1e-6);
        assert_relative_eq!(gaussian_threshold(2.0, 0.025).unwrap(), 2.0 * 1.959964, epsilon = 1e-5);
        assert!(check_variance(0.0).is_err());
        assert!(check_alpha(1.0).is_err());
    }
}
