//! # Analysis
//!
//! $$
//! \operatorname{VaR}_\alpha:\ \int_{-\infty}^{x}\hat f(s)\,ds=\alpha
//! $$
//!
//! Cross-sectional reads over a simulation ensemble and density-based
//! Value-at-Risk. The payoff is an injected capability; nothing here knows
//! what a portfolio is.

use std::path::Path;

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use roots::find_root_brent;
use roots::SimpleConvergency;
use tracing::debug;

use crate::ensemble::Ensemble;
use crate::error::Result;
use crate::error::RiskyError;
use crate::stats::gaussian_kde::GaussianKde;

pub struct Analysis {
  ensemble: Ensemble,
}

impl Analysis {
  pub fn new(ensemble: Ensemble) -> Self {
    Self { ensemble }
  }

  /// Open a persisted run directory.
  pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
    Ok(Self::new(Ensemble::load(dir)?))
  }

  pub fn ensemble(&self) -> &Ensemble {
    &self.ensemble
  }

  pub fn securities(&self) -> &[String] {
    self.ensemble.securities()
  }

  /// All simulated values at one future time step, shape
  /// `(num_iterations, num_securities)`. Recomputed on every call.
  pub fn cross_section(&self, time_step: usize) -> Result<Array2<f64>> {
    if time_step >= self.ensemble.num_steps() {
      return Err(RiskyError::StepOutOfRange {
        step: time_step,
        num_steps: self.ensemble.num_steps(),
      });
    }

    let n = self.ensemble.num_securities();
    let iters = self.ensemble.num_iterations();
    let simulation = self.ensemble.simulation();

    let mut section = Array2::<f64>::zeros((iters, n));
    for iteration in 0..iters {
      for j in 0..n {
        section[[iteration, j]] = simulation[[time_step, iteration * n + j]];
      }
    }
    Ok(section)
  }

  /// Apply the payoff capability to each iteration's price vector at one
  /// time step.
  pub fn payoff_sample<F>(&self, time_step: usize, payoff: F) -> Result<Array1<f64>>
  where
    F: Fn(ArrayView1<'_, f64>) -> f64,
  {
    let section = self.cross_section(time_step)?;
    Ok(Array1::from_iter(
      section.rows().into_iter().map(|prices| payoff(prices)),
    ))
  }

  /// The `alpha`-quantile of the simulated payoff distribution.
  ///
  /// A Gaussian KDE is fitted to the payoff sample and its closed-form CDF
  /// is solved for `alpha` with a bracketed Brent search, which converges
  /// on any density the KDE can produce; the iteration count is bounded
  /// either way.
  pub fn value_at_risk<F>(&self, time_step: usize, payoff: F, alpha: f64) -> Result<f64>
  where
    F: Fn(ArrayView1<'_, f64>) -> f64,
  {
    if !(0.0..1.0).contains(&alpha) || alpha <= 0.0 {
      return Err(RiskyError::InvalidInput(format!(
        "alpha must lie strictly between 0 and 1, got {alpha}"
      )));
    }

    let sample = self.payoff_sample(time_step, payoff)?;
    if sample.iter().any(|v| !v.is_finite()) {
      return Err(RiskyError::InvalidInput(
        "payoff produced a non-finite value".to_string(),
      ));
    }

    let kde = GaussianKde::from_sample(sample)?;
    let (mut lo, mut hi) = kde.support();

    // The support interval already carries essentially all mass; widen a
    // bounded number of times in case alpha sits in an extreme tail.
    let mut widenings = 0;
    while kde.cdf(lo) > alpha || kde.cdf(hi) < alpha {
      let width = hi - lo;
      lo -= width;
      hi += width;
      widenings += 1;
      if widenings > 60 {
        return Err(RiskyError::RootFinding(format!(
          "failed to bracket the {alpha}-quantile"
        )));
      }
    }

    let mut convergency = SimpleConvergency {
      eps: 1e-10,
      max_iter: 200,
    };
    let var = find_root_brent(lo, hi, |x| kde.cdf(x) - alpha, &mut convergency)
      .map_err(|e| RiskyError::RootFinding(format!("quantile search did not converge: {e}")))?;

    debug!(time_step, alpha, var, "value at risk");
    Ok(var)
  }
}
