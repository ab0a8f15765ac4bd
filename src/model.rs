//! # Stochastic Models
//!
//! $$
//! X_t = X_0\,e^{\sum_{s\le t} r_s}
//! $$
//!
//! Calibratable models over a basket of securities. Every variant walks the
//! same state machine and exposes the same capability set, so the ensemble
//! runner never needs to know which model it is driving.
//!
//! | Variant            | Marginals            | Dependence                     |
//! |--------------------|----------------------|--------------------------------|
//! | [`GBM`]            | Gaussian (parametric)| sample covariance              |
//! | [`GaussianCopula`] | empirical            | rank-based Pearson correlation |
//! | [`TCopula`]        | empirical            | Kendall's tau bridge           |

mod copula;
pub mod gaussian_copula;
pub mod gbm;
pub mod tcopula;

pub use copula::CopulaParams;
pub use gaussian_copula::GaussianCopula;
pub use gbm::GBM;
pub use tcopula::TCopula;

use ndarray::Array1;
use ndarray::Array2;
use rand::rngs::StdRng;

use crate::error::Result;
use crate::error::RiskyError;
use crate::history::HistoricalSeries;

/// Explicit lifecycle of a model: historical data arrives, parameters are
/// fitted, and any new data demotes the model back to uncalibrated.
#[derive(Clone, Debug)]
pub enum ModelState<P> {
  Uninitialized,
  HistoricalLoaded(HistoricalSeries),
  Calibrated {
    historical: HistoricalSeries,
    params: P,
  },
}

impl<P> Default for ModelState<P> {
  fn default() -> Self {
    ModelState::Uninitialized
  }
}

impl<P> ModelState<P> {
  /// Replace the historical data. A calibrated model is demoted because
  /// its parameters are now stale.
  pub fn load_historical(&mut self, historical: HistoricalSeries) {
    *self = ModelState::HistoricalLoaded(historical);
  }

  pub fn is_calibrated(&self) -> bool {
    matches!(self, ModelState::Calibrated { .. })
  }

  pub fn historical(&self) -> Result<&HistoricalSeries> {
    match self {
      ModelState::Uninitialized => Err(RiskyError::NoHistoricalData),
      ModelState::HistoricalLoaded(h) => Ok(h),
      ModelState::Calibrated { historical, .. } => Ok(historical),
    }
  }

  pub fn params(&self) -> Result<&P> {
    match self {
      ModelState::Calibrated { params, .. } => Ok(params),
      _ => Err(RiskyError::NotCalibrated),
    }
  }

  /// Fit parameters with `fit` and move to `Calibrated`. The closure runs
  /// on the stored historical data; on failure the state is left in
  /// `HistoricalLoaded` so the caller can retry with more data.
  pub fn calibrate_with<F>(&mut self, fit: F) -> Result<()>
  where
    F: FnOnce(&HistoricalSeries) -> Result<P>,
  {
    let historical = match std::mem::take(self) {
      ModelState::Uninitialized => return Err(RiskyError::NoHistoricalData),
      ModelState::HistoricalLoaded(h) => h,
      ModelState::Calibrated { historical, .. } => historical,
    };

    match fit(&historical) {
      Ok(params) => {
        *self = ModelState::Calibrated { historical, params };
        Ok(())
      }
      Err(e) => {
        *self = ModelState::HistoricalLoaded(historical);
        Err(e)
      }
    }
  }
}

/// The capability set shared by all model variants.
pub trait StochasticModel: Send + Sync {
  /// Short machine-friendly name, used in persisted run directories.
  fn name(&self) -> &'static str;

  fn is_calibrated(&self) -> bool;

  /// Historical data the model currently holds.
  fn historical(&self) -> Result<&HistoricalSeries>;

  /// Load historical data, invalidating any previous calibration.
  fn add_historical(&mut self, historical: HistoricalSeries);

  /// Fit model parameters to the stored historical data.
  fn calibrate(&mut self) -> Result<()>;

  /// Simulate one joint price path of shape `(num_steps, num_securities)`.
  /// All values are strictly positive.
  fn simulate_path(&self, num_steps: usize, rng: &mut StdRng) -> Result<Array2<f64>>;

  /// Simulate the terminal prices `num_steps` ahead without returning the
  /// intermediate path. See each variant for its jump semantics.
  fn simulate_jump(&self, num_steps: usize, rng: &mut StdRng) -> Result<Array1<f64>>;
}

pub(crate) fn check_num_steps(num_steps: usize) -> Result<()> {
  if num_steps == 0 {
    return Err(RiskyError::InvalidInput(
      "num_steps must be at least 1".to_string(),
    ));
  }
  Ok(())
}
