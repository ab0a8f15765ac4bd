//! # Gaussian KDE
//!
//! $$
//! \hat f_h(x)=\frac1{nh}\sum_{i=1}^n\varphi\!\left(\frac{x-X_i}{h}\right)
//! $$
//!
//! Kernel density estimate over a payoff sample. Because the kernel is
//! Gaussian the CDF has a closed form (a mean of normal CDFs), which keeps
//! the Value-at-Risk quantile search free of numerical quadrature.

use ndarray::Array1;
use ndarray_stats::QuantileExt;
use statrs::distribution::Continuous;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;

use crate::error::Result;
use crate::error::RiskyError;

#[derive(Debug)]
pub struct GaussianKde {
  data: Array1<f64>,
  bandwidth: f64,
  kernel: Normal,
}

impl GaussianKde {
  /// Fit a KDE with an explicit bandwidth.
  pub fn new(data: Array1<f64>, bandwidth: f64) -> Result<Self> {
    if data.len() < 2 {
      return Err(RiskyError::InsufficientData(format!(
        "kernel density estimation needs at least 2 observations, got {}",
        data.len()
      )));
    }
    if !bandwidth.is_finite() || bandwidth <= 0.0 {
      return Err(RiskyError::InvalidInput(format!(
        "bandwidth must be a positive finite number, got {bandwidth}"
      )));
    }
    if data.iter().any(|v| !v.is_finite()) {
      return Err(RiskyError::InvalidInput(
        "kernel density estimation requires finite observations".to_string(),
      ));
    }
    Ok(Self {
      data,
      bandwidth,
      kernel: Normal::new(0.0, 1.0).unwrap(),
    })
  }

  /// Fit a KDE with the bandwidth chosen by Silverman's rule of thumb.
  pub fn from_sample(data: Array1<f64>) -> Result<Self> {
    if data.iter().any(|v| !v.is_finite()) {
      return Err(RiskyError::InvalidInput(
        "kernel density estimation requires finite observations".to_string(),
      ));
    }
    let h = silverman_bandwidth(&data);
    Self::new(data, h)
  }

  pub fn bandwidth(&self) -> f64 {
    self.bandwidth
  }

  /// Estimated density at `x`.
  pub fn density(&self, x: f64) -> f64 {
    let h = self.bandwidth;
    let sum: f64 = self
      .data
      .iter()
      .map(|&xi| self.kernel.pdf((x - xi) / h))
      .sum();
    sum / (h * self.data.len() as f64)
  }

  /// Exact integral of the estimated density over `(-inf, x]`.
  pub fn cdf(&self, x: f64) -> f64 {
    let h = self.bandwidth;
    let sum: f64 = self
      .data
      .iter()
      .map(|&xi| self.kernel.cdf((x - xi) / h))
      .sum();
    sum / self.data.len() as f64
  }

  /// Interval carrying essentially all of the estimated mass, suitable as
  /// a root-finding bracket.
  pub fn support(&self) -> (f64, f64) {
    let lo = *self.data.min().expect("data is non-empty and finite");
    let hi = *self.data.max().expect("data is non-empty and finite");
    (lo - 8.0 * self.bandwidth, hi + 8.0 * self.bandwidth)
  }
}

/// Silverman's rule of thumb, `h = 0.9 min(sigma, IQR/1.34) n^{-1/5}`,
/// floored to stay usable on near-degenerate samples.
pub fn silverman_bandwidth(data: &Array1<f64>) -> f64 {
  let n = data.len() as f64;
  if n < 2.0 {
    return 1e-6;
  }

  let mean = data.mean().unwrap_or(0.0);
  let std = (data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();

  let mut sorted = data.to_vec();
  sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
  let iqr = quantile_sorted(&sorted, 0.75) - quantile_sorted(&sorted, 0.25);

  let scale = if iqr > 0.0 { std.min(iqr / 1.34) } else { std };
  let h = 0.9 * scale * n.powf(-0.2);
  h.max(1e-8)
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
  let rank = q * (sorted.len() as f64 - 1.0);
  let lo = rank.floor() as usize;
  let hi = rank.ceil() as usize;
  if lo == hi {
    sorted[lo]
  } else {
    let w = rank - lo as f64;
    sorted[lo] + w * (sorted[hi] - sorted[lo])
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use ndarray::Array1;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;

  use super::silverman_bandwidth;
  use super::GaussianKde;

  fn standard_normal_sample(n: usize, seed: u64) -> Array1<f64> {
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    Array1::from_iter((0..n).map(|_| normal.sample(&mut rng)))
  }

  #[test]
  fn density_is_finite_and_non_negative() {
    let kde = GaussianKde::new(Array1::from(vec![1.0, 2.0, 3.0]), 0.5).unwrap();
    for x in [-5.0, 0.0, 2.0, 10.0] {
      let d = kde.density(x);
      assert!(d.is_finite() && d >= 0.0);
    }
  }

  #[test]
  fn cdf_is_monotone_from_zero_to_one() {
    let kde = GaussianKde::from_sample(standard_normal_sample(500, 3)).unwrap();
    let (lo, hi) = kde.support();
    assert!(kde.cdf(lo) < 1e-3);
    assert!(kde.cdf(hi) > 1.0 - 1e-3);

    let mut prev = 0.0;
    for i in 0..=50 {
      let x = lo + (hi - lo) * i as f64 / 50.0;
      let c = kde.cdf(x);
      assert!(c >= prev);
      prev = c;
    }
  }

  #[test]
  fn cdf_tracks_the_underlying_distribution() {
    let kde = GaussianKde::from_sample(standard_normal_sample(4000, 11)).unwrap();
    assert_relative_eq!(kde.cdf(0.0), 0.5, epsilon = 0.03);
    assert_relative_eq!(kde.cdf(1.0), 0.8413, epsilon = 0.03);
  }

  #[test]
  fn silverman_bandwidth_is_positive_and_modest() {
    let h = silverman_bandwidth(&Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]));
    assert!(h > 0.0 && h < 10.0);
  }

  #[test]
  fn degenerate_sample_still_yields_a_usable_bandwidth() {
    let h = silverman_bandwidth(&Array1::from_elem(64, 2.5));
    assert!(h >= 1e-8);
  }
}
