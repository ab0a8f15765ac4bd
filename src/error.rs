//! # Errors
//!
//! $$
//! \text{bad input} \ne \text{numerical failure} \ne \text{I/O failure}
//! $$
//!
//! One taxonomy for the whole pipeline so callers can pick a recovery
//! strategy from the variant alone.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskyError {
  /// Malformed or incompatible historical data.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// Sample too small for a statistical estimator.
  #[error("insufficient data: {0}")]
  InsufficientData(String),

  /// Non-positive-definite correlation, degenerate covariance or a
  /// failed estimator.
  #[error("calibration failed: {0}")]
  Calibration(String),

  /// `calibrate` was called before any historical data was loaded.
  #[error("no historical data to calibrate to")]
  NoHistoricalData,

  /// A simulation was requested from an uncalibrated model.
  #[error("model is not calibrated")]
  NotCalibrated,

  /// A cross-section was requested past the end of the ensemble.
  #[error("time step {step} out of range, ensemble has {num_steps} steps")]
  StepOutOfRange { step: usize, num_steps: usize },

  /// I/O failure while writing or reading a persisted ensemble.
  #[error("ensemble persistence failed: {0}")]
  Persistence(String),

  /// The Value-at-Risk solver did not converge.
  #[error("root finding failed: {0}")]
  RootFinding(String),
}

pub type Result<T, E = RiskyError> = std::result::Result<T, E>;
