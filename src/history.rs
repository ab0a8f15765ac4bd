//! # Historical Series
//!
//! $$
//! r_t=\ln\frac{P_t}{P_{t-1}}
//! $$
//!
//! Typed container for per-security price history. First differences and
//! log-returns are derived once at ingestion and never mutated afterwards;
//! their first row is undefined and stored as `NaN`.

use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;

use crate::error::Result;
use crate::error::RiskyError;

#[derive(Clone, Debug)]
pub struct HistoricalSeries {
  securities: Vec<String>,
  prices: Array2<f64>,
  diffs: Array2<f64>,
  log_returns: Array2<f64>,
}

impl HistoricalSeries {
  /// Build a series from `(name, prices)` columns in insertion order.
  ///
  /// All columns must share the same length (at least 2) and every price
  /// must be a finite positive number.
  pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
    if columns.is_empty() {
      return Err(RiskyError::InvalidInput(
        "at least one security is required".to_string(),
      ));
    }

    let len = columns[0].1.len();
    if len < 2 {
      return Err(RiskyError::InvalidInput(format!(
        "price series must have at least 2 observations, got {len}"
      )));
    }

    let mut securities = Vec::with_capacity(columns.len());
    for (name, prices) in &columns {
      if name.is_empty() || name.contains(',') || name.chars().any(|c| c.is_control()) {
        return Err(RiskyError::InvalidInput(format!(
          "invalid security name {name:?}"
        )));
      }
      if securities.contains(name) {
        return Err(RiskyError::InvalidInput(format!(
          "duplicate security name {name:?}"
        )));
      }
      if prices.len() != len {
        return Err(RiskyError::InvalidInput(format!(
          "security {name:?} has {} observations, expected {len}",
          prices.len()
        )));
      }
      if let Some(p) = prices.iter().find(|p| !p.is_finite() || **p <= 0.0) {
        return Err(RiskyError::InvalidInput(format!(
          "security {name:?} contains a non-positive or non-finite price {p}"
        )));
      }
      securities.push(name.clone());
    }

    let n = columns.len();
    let mut prices = Array2::<f64>::zeros((len, n));
    for (j, (_, col)) in columns.iter().enumerate() {
      for (t, &p) in col.iter().enumerate() {
        prices[[t, j]] = p;
      }
    }

    let mut diffs = Array2::<f64>::from_elem((len, n), f64::NAN);
    let mut log_returns = Array2::<f64>::from_elem((len, n), f64::NAN);
    for t in 1..len {
      for j in 0..n {
        diffs[[t, j]] = prices[[t, j]] - prices[[t - 1, j]];
        log_returns[[t, j]] = (prices[[t, j]] / prices[[t - 1, j]]).ln();
      }
    }

    Ok(Self {
      securities,
      prices,
      diffs,
      log_returns,
    })
  }

  /// Security names in insertion order; the column order of every derived
  /// table.
  pub fn securities(&self) -> &[String] {
    &self.securities
  }

  /// Number of historical observations per security.
  pub fn len(&self) -> usize {
    self.prices.nrows()
  }

  pub fn is_empty(&self) -> bool {
    self.prices.nrows() == 0
  }

  pub fn num_securities(&self) -> usize {
    self.securities.len()
  }

  pub fn prices(&self) -> &Array2<f64> {
    &self.prices
  }

  /// First differences, first row `NaN`.
  pub fn diffs(&self) -> &Array2<f64> {
    &self.diffs
  }

  /// Log-returns, first row `NaN`.
  pub fn log_returns(&self) -> &Array2<f64> {
    &self.log_returns
  }

  /// Log-returns with the undefined first row dropped, shape
  /// `(len - 1, num_securities)`.
  pub fn complete_log_returns(&self) -> Array2<f64> {
    self.log_returns.slice(s![1.., ..]).to_owned()
  }

  /// Last complete price row, the simulation anchor `X0`.
  pub fn last_prices(&self) -> Array1<f64> {
    self.prices.row(self.prices.nrows() - 1).to_owned()
  }
}
