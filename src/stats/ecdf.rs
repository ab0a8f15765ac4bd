//! # Empirical Marginal
//!
//! $$
//! \hat F_n(x)=\frac{\#\{X_i\le x\}}{n}
//! $$
//!
//! Per-security empirical distribution of log-returns: a right-continuous
//! step CDF plus a precomputed piecewise-linear inverse used to turn
//! correlated uniforms back into return increments.

use crate::error::Result;
use crate::error::RiskyError;
use crate::stats::interp::invert_monotone;
use crate::stats::interp::MonotoneInterp;

#[derive(Clone, Debug)]
pub struct EmpiricalMarginal {
  sorted: Vec<f64>,
  inverse: MonotoneInterp,
}

impl EmpiricalMarginal {
  /// Build the marginal from a sample, ignoring non-finite observations.
  /// Fewer than 2 finite observations cannot pin down a distribution.
  pub fn from_sample<I>(sample: I) -> Result<Self>
  where
    I: IntoIterator<Item = f64>,
  {
    let mut sorted: Vec<f64> = sample.into_iter().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    if sorted.len() < 2 {
      return Err(RiskyError::InsufficientData(format!(
        "empirical marginal needs at least 2 finite observations, got {}",
        sorted.len()
      )));
    }

    // Evaluate the step CDF at the ordered sample and invert the
    // resulting (value, probability) pairs over the probability axis.
    let n = sorted.len() as f64;
    let probs: Vec<f64> = (0..sorted.len()).map(|i| (i + 1) as f64 / n).collect();
    let inverse = invert_monotone(&sorted, &probs)?;

    Ok(Self { sorted, inverse })
  }

  /// Fraction of the sample at or below `x`.
  pub fn cdf(&self, x: f64) -> f64 {
    let count = self.sorted.partition_point(|&v| v <= x);
    count as f64 / self.sorted.len() as f64
  }

  /// Quantile of the empirical distribution at probability `p`.
  ///
  /// Linear interpolation between observed points, linear extrapolation
  /// beyond the observed probability range. Never clamps and never fails;
  /// callers drawing `p` near 0 or 1 get an extrapolated tail value.
  pub fn inverse(&self, p: f64) -> f64 {
    self.inverse.eval(p)
  }

  pub fn len(&self) -> usize {
    self.sorted.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sorted.is_empty()
  }

  /// Smallest and largest observed value.
  pub fn range(&self) -> (f64, f64) {
    (self.sorted[0], self.sorted[self.sorted.len() - 1])
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;

  use super::EmpiricalMarginal;
  use crate::error::RiskyError;

  #[test]
  fn cdf_is_a_right_continuous_step() {
    let m = EmpiricalMarginal::from_sample(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_relative_eq!(m.cdf(0.5), 0.0);
    assert_relative_eq!(m.cdf(1.0), 0.25);
    assert_relative_eq!(m.cdf(2.5), 0.5);
    assert_relative_eq!(m.cdf(4.0), 1.0);
    assert_relative_eq!(m.cdf(9.0), 1.0);
  }

  #[test]
  fn inverse_round_trips_interior_points() {
    let m = EmpiricalMarginal::from_sample((1..=20).map(|i| i as f64)).unwrap();
    for &x in &[3.0, 7.0, 12.0, 18.0] {
      assert_relative_eq!(m.inverse(m.cdf(x)), x, epsilon = 1e-10);
    }
  }

  #[test]
  fn round_trip_error_shrinks_with_sample_size() {
    let normal = Normal::new(0.0, 1.0).unwrap();
    let err_for = |n: usize, seed: u64| {
      let mut rng = StdRng::seed_from_u64(seed);
      let sample: Vec<f64> = (0..n).map(|_| normal.sample(&mut rng)).collect();
      let m = EmpiricalMarginal::from_sample(sample).unwrap();
      [-0.5, 0.0, 0.7]
        .iter()
        .map(|&x| (m.inverse(m.cdf(x)) - x).abs())
        .fold(0.0_f64, f64::max)
    };

    let coarse = err_for(50, 7);
    let fine = err_for(5000, 7);
    assert!(
      fine < coarse,
      "interpolation error should shrink with sample size: {fine} vs {coarse}"
    );
  }

  #[test]
  fn extrapolates_beyond_observed_probabilities() {
    let m = EmpiricalMarginal::from_sample(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    // Below the smallest observed probability the inverse follows the
    // first segment's slope instead of clamping to the minimum.
    assert!(m.inverse(0.01) < 1.0);
    assert!(m.inverse(0.01).is_finite());
  }

  #[test]
  fn non_finite_observations_are_ignored() {
    let m =
      EmpiricalMarginal::from_sample(vec![f64::NAN, 1.0, f64::INFINITY, 2.0, 3.0]).unwrap();
    assert_eq!(m.len(), 3);
  }

  #[test]
  fn rejects_tiny_samples() {
    let err = EmpiricalMarginal::from_sample(vec![1.0, f64::NAN]).unwrap_err();
    assert!(matches!(err, RiskyError::InsufficientData(_)));
  }
}
