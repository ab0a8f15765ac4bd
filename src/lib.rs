//! # Monte Carlo Risk Simulation
//!
//! `risky-rs` calibrates stochastic models to historical security prices and
//! draws joint Monte Carlo price-path ensembles from them.
//!
//! ## Modules
//!
//! | Module         | Description                                                                       |
//! |----------------|-----------------------------------------------------------------------------------|
//! | [`history`]    | Historical price container with derived first-difference and log-return columns.  |
//! | [`stats`]      | Empirical marginals, monotone function inversion and kernel density estimation.   |
//! | [`dependence`] | Correlation-structure estimators and their Cholesky factors.                      |
//! | [`model`]      | Calibratable stochastic models (parametric Gaussian, Gaussian and t copulas).     |
//! | [`ensemble`]   | Ensemble runner, simulation tensor layout and atomic run persistence.             |
//! | [`analysis`]   | Cross-section extraction and density-based Value-at-Risk.                         |
//!
//! ## Pipeline
//!
//! Raw prices enter through [`history::HistoricalSeries`], a model from
//! [`model`] is calibrated against them, [`ensemble::EnsembleRunner`] draws
//! and persists the simulation tensor, and [`analysis::Analysis`] reads
//! cross-sections back out of it.
//!
//! ## Parallelism
//!
//! The Monte Carlo iterations inside [`ensemble::EnsembleRunner`] run on
//! `rayon` workers, each with an independently seeded random source.

pub mod analysis;
pub mod dependence;
pub mod ensemble;
pub mod error;
pub mod history;
pub mod model;
pub mod stats;

pub use error::Result;
pub use error::RiskyError;
