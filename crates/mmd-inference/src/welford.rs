//! Online Welford accumulators for streamed per-block estimates.
//!
//! Every per-block scalar is folded exactly once, in block order, so the
//! running values do not depend on how blocks were grouped into bursts.

/// Running mean (Welford recurrence, no second moment).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    mean: f64,
    count: usize,
}

impl RunningMean {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Incorporate one observation.
    #[inline]
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        self.mean += (x - self.mean) / self.count as f64;
    }

    /// Current mean (0 if nothing was folded).
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Number of folded observations.
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Running mean plus accumulated sum of squared deviations (`M2`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningVariance {
    mean: f64,
    m2: f64,
    count: usize,
}

impl RunningVariance {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Incorporate one observation.
    #[inline]
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Current mean.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Accumulated sum of squared deviations from the mean.
    pub fn m2(&self) -> f64 {
        self.m2
    }

    /// Number of folded observations.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Population variance `M2 / n`. `None` if nothing was folded.
    pub fn variance(&self) -> Option<f64> {
        (self.count > 0).then(|| self.m2 / self.count as f64)
    }

    /// Sample variance `M2 / (n - 1)`. `None` if `count < 2`.
    pub fn sample_variance(&self) -> Option<f64> {
        (self.count > 1).then(|| self.m2 / (self.count - 1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn test_running_mean_matches_batch_mean_1e5() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let dist = Normal::new(3.0, 10.0).unwrap();
        let xs: Vec<f64> = (0..100_000).map(|_| dist.sample(&mut rng)).collect();

        let mut acc = RunningMean::new();
        for &x in &xs {
            acc.push(x);
        }
        let naive = xs.iter().sum::<f64>() / xs.len() as f64;
        assert_eq!(acc.count(), 100_000);
        assert_relative_eq!(acc.mean(), naive, epsilon = 1e-9);
    }

    #[test]
    fn test_running_variance_matches_two_pass() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let dist = Normal::new(1e6, 0.5).unwrap();
        let xs: Vec<f64> = (0..10_000).map(|_| dist.sample(&mut rng)).collect();

        let mut acc = RunningVariance::new();
        for &x in &xs {
            acc.push(x);
        }
        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let m2 = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>();
        assert_relative_eq!(acc.mean(), mean, max_relative = 1e-12);
        assert_relative_eq!(acc.m2(), m2, max_relative = 1e-6);
        assert_relative_eq!(acc.variance().unwrap(), m2 / n, max_relative = 1e-6);
        assert_relative_eq!(acc.sample_variance().unwrap(), m2 / (n - 1.0), max_relative = 1e-6);
    }

    #[test]
    fn test_empty_accumulators() {
        assert_eq!(RunningMean::new().mean(), 0.0);
        assert!(RunningVariance::new().variance().is_none());
        let mut one = RunningVariance::new();
        one.push(2.0);
        assert_eq!(one.variance(), Some(0.0));
        assert!(one.sample_variance().is_none());
    }
}
