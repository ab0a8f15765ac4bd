//! # Parametric Gaussian Model
//!
//! $$
//! r_t\sim\mathcal N(\mu,\Sigma)
//! $$
//!
//! Multivariate geometric Brownian motion: log-returns are jointly normal
//! with the sample drift and covariance of the historical data.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use tracing::debug;

use crate::dependence::cholesky_lower;
use crate::error::Result;
use crate::error::RiskyError;
use crate::history::HistoricalSeries;
use crate::model::check_num_steps;
use crate::model::ModelState;
use crate::model::StochasticModel;

#[derive(Clone, Debug)]
pub struct GbmParams {
  pub drift: Array1<f64>,
  pub covariance: Array2<f64>,
  pub cholesky: Array2<f64>,
  pub x0: Array1<f64>,
}

#[derive(Debug, Default)]
pub struct GBM {
  state: ModelState<GbmParams>,
}

impl GBM {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn params(&self) -> Result<&GbmParams> {
    self.state.params()
  }

  fn fit(historical: &HistoricalSeries) -> Result<GbmParams> {
    let returns = historical.complete_log_returns();
    let m = returns.nrows();
    if m < 2 {
      return Err(RiskyError::InsufficientData(format!(
        "covariance estimation needs at least 2 return observations, got {m}"
      )));
    }

    let drift = returns
      .mean_axis(Axis(0))
      .expect("return matrix has at least one row");

    let n = returns.ncols();
    let mut covariance = Array2::<f64>::zeros((n, n));
    for i in 0..n {
      for j in i..n {
        let mut acc = 0.0;
        for t in 0..m {
          acc += (returns[[t, i]] - drift[i]) * (returns[[t, j]] - drift[j]);
        }
        let c = acc / (m - 1) as f64;
        covariance[[i, j]] = c;
        covariance[[j, i]] = c;
      }
    }

    let cholesky = cholesky_lower(&covariance)
      .map_err(|e| RiskyError::Calibration(format!("covariance is degenerate: {e}")))?;

    debug!(securities = n, observations = m, "calibrated parametric Gaussian model");

    Ok(GbmParams {
      drift,
      covariance,
      cholesky,
      x0: historical.last_prices(),
    })
  }
}

impl StochasticModel for GBM {
  fn name(&self) -> &'static str {
    "gbm"
  }

  fn is_calibrated(&self) -> bool {
    self.state.is_calibrated()
  }

  fn historical(&self) -> Result<&HistoricalSeries> {
    self.state.historical()
  }

  fn add_historical(&mut self, historical: HistoricalSeries) {
    self.state.load_historical(historical);
  }

  fn calibrate(&mut self) -> Result<()> {
    self.state.calibrate_with(Self::fit)
  }

  /// Random walk in log-space: per step `r = mu + L z`, accumulated and
  /// exponentiated against `X0`.
  fn simulate_path(&self, num_steps: usize, rng: &mut StdRng) -> Result<Array2<f64>> {
    check_num_steps(num_steps)?;
    let params = self.state.params()?;
    let n = params.drift.len();

    let mut path = Array2::<f64>::zeros((num_steps, n));
    let mut cum = Array1::<f64>::zeros(n);
    for t in 0..num_steps {
      let z = Array1::random_using(n, StandardNormal, rng);
      let shock = &params.drift + &params.cholesky.dot(&z);
      cum += &shock;
      for j in 0..n {
        path[[t, j]] = params.x0[j] * cum[j].exp();
      }
    }
    Ok(path)
  }

  /// One-shot terminal draw `X0 exp(mu k + sqrt(k) L z)`: a single shock
  /// scaled to the horizon instead of `k` accumulated one-step shocks.
  fn simulate_jump(&self, num_steps: usize, rng: &mut StdRng) -> Result<Array1<f64>> {
    check_num_steps(num_steps)?;
    let params = self.state.params()?;
    let n = params.drift.len();
    let k = num_steps as f64;

    let z = Array1::random_using(n, StandardNormal, rng);
    let shock = params.cholesky.dot(&z);
    let mut terminal = Array1::<f64>::zeros(n);
    for j in 0..n {
      terminal[j] = params.x0[j] * (params.drift[j] * k + k.sqrt() * shock[j]).exp();
    }
    Ok(terminal)
  }
}
