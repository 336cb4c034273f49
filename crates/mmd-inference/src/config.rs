//! Estimator configuration.

use mmd_core::{
    Error, NullApproximationMethod, Result, StatisticType, VarianceEstimationMethod,
};
use serde::{Deserialize, Serialize};

fn default_num_null_samples() -> usize {
    250
}

/// Settings shared by every streaming call.
///
/// Deserializes from JSON with every field optional:
///
/// ```json
/// { "statistic_type": "unbiased_incomplete", "num_null_samples": 500, "seed": 7 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmdConfig {
    /// Per-block estimator.
    pub statistic_type: StatisticType,
    /// How the null variance is estimated.
    pub variance_estimation_method: VarianceEstimationMethod,
    /// How p-values and thresholds are derived.
    pub null_approximation_method: NullApproximationMethod,
    /// Number of null draws produced by `sample_null`.
    #[serde(default = "default_num_null_samples")]
    pub num_null_samples: usize,
    /// Dispatch jobs on the GPU backend.
    pub use_gpu: bool,
    /// Seed for randomized jobs. `None` draws a fresh seed per estimator.
    pub seed: Option<u64>,
    /// Worker threads (0 = rayon default).
    pub n_threads: usize,
}

impl Default for MmdConfig {
    fn default() -> Self {
        Self {
            statistic_type: StatisticType::default(),
            variance_estimation_method: VarianceEstimationMethod::default(),
            null_approximation_method: NullApproximationMethod::default(),
            num_null_samples: default_num_null_samples(),
            use_gpu: false,
            seed: None,
            n_threads: 0,
        }
    }
}

impl MmdConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that can never run.
    pub fn validate(&self) -> Result<()> {
        if self.num_null_samples == 0 {
            return Err(Error::Config("num_null_samples must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = MmdConfig::default();
        assert_eq!(c.statistic_type, StatisticType::UnbiasedFull);
        assert_eq!(c.variance_estimation_method, VarianceEstimationMethod::Direct);
        assert_eq!(c.null_approximation_method, NullApproximationMethod::Permutation);
        assert_eq!(c.num_null_samples, 250);
        assert!(c.seed.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let c = MmdConfig::from_json_str(
            r#"{"statistic_type": "biased_full", "null_approximation_method": "mmd1_gaussian", "seed": 3}"#,
        )
        .unwrap();
        assert_eq!(c.statistic_type, StatisticType::BiasedFull);
        assert_eq!(c.null_approximation_method, NullApproximationMethod::Mmd1Gaussian);
        assert_eq!(c.seed, Some(3));
        assert_eq!(c.num_null_samples, 250);
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(matches!(
            MmdConfig::from_json_str(r#"{"num_null_samples": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            MmdConfig::from_json_str(r#"{"statistic_type": "quadratic"}"#),
            Err(Error::Json(_))
        ));
    }
}
