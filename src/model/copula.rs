//! # Copula Plumbing
//!
//! $$
//! F(x_1,\dots,x_n)=C\!\left(F_1(x_1),\dots,F_n(x_n)\right)
//! $$
//!
//! What the copula variants share: empirically fitted marginals on one
//! side, a [`DependenceParameters`] object on the other. The two halves
//! stay decoupled so a model can swap its dependence estimator without
//! touching how marginals are fitted or inverted.

use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;

use crate::dependence::DependenceParameters;
use crate::error::Result;
use crate::history::HistoricalSeries;
use crate::stats::ecdf::EmpiricalMarginal;

/// Calibrated state of a copula model: per-security empirical marginals,
/// the dependence structure over their pseudo-observations, and the
/// simulation anchor.
#[derive(Clone, Debug)]
pub struct CopulaParams {
  pub marginals: Vec<EmpiricalMarginal>,
  pub dependence: DependenceParameters,
  pub x0: Array1<f64>,
}

/// Fit one empirical marginal per security and push every historical
/// log-return through its own CDF, yielding the pseudo-observation matrix
/// the dependence estimators consume.
pub(crate) fn fit_marginals(
  historical: &HistoricalSeries,
) -> Result<(Vec<EmpiricalMarginal>, Array2<f64>)> {
  let returns = historical.complete_log_returns();
  let n = returns.ncols();

  let mut marginals = Vec::with_capacity(n);
  for j in 0..n {
    marginals.push(EmpiricalMarginal::from_sample(returns.column(j).to_vec())?);
  }

  let mut pseudo = Array2::<f64>::zeros(returns.dim());
  for t in 0..returns.nrows() {
    for j in 0..n {
      pseudo[[t, j]] = marginals[j].cdf(returns[[t, j]]);
    }
  }

  debug!(
    securities = n,
    observations = returns.nrows(),
    "fitted empirical marginals"
  );
  Ok((marginals, pseudo))
}

/// Turn a `(num_steps, n)` matrix of correlated uniforms into a price
/// path: invert each marginal, accumulate the increments NaN-safely (a
/// NaN from tail extrapolation contributes zero) and exponentiate against
/// `X0`.
pub(crate) fn price_path_from_uniforms(
  params: &CopulaParams,
  uniforms: &Array2<f64>,
) -> Array2<f64> {
  let (num_steps, n) = uniforms.dim();
  let mut path = Array2::<f64>::zeros((num_steps, n));
  let mut cum = Array1::<f64>::zeros(n);

  for t in 0..num_steps {
    for j in 0..n {
      let r = params.marginals[j].inverse(uniforms[[t, j]]);
      if r.is_finite() {
        cum[j] += r;
      }
      path[[t, j]] = params.x0[j] * cum[j].exp();
    }
  }
  path
}

#[cfg(test)]
mod tests {
  use ndarray::Array2;

  use super::fit_marginals;
  use super::price_path_from_uniforms;
  use super::CopulaParams;
  use crate::dependence::gaussian_dependence;
  use crate::history::HistoricalSeries;

  fn params() -> CopulaParams {
    let series = HistoricalSeries::from_columns(vec![
      (
        "A".to_string(),
        vec![100.0, 101.0, 99.0, 102.0, 100.0, 103.0, 101.5, 104.0],
      ),
      (
        "B".to_string(),
        vec![50.0, 50.5, 49.8, 51.0, 50.2, 51.5, 50.7, 52.0],
      ),
    ])
    .unwrap();
    let (marginals, pseudo) = fit_marginals(&series).unwrap();
    CopulaParams {
      marginals,
      dependence: gaussian_dependence(&pseudo).unwrap(),
      x0: series.last_prices(),
    }
  }

  #[test]
  fn pseudo_observations_live_in_the_unit_interval() {
    let series = HistoricalSeries::from_columns(vec![(
      "A".to_string(),
      vec![100.0, 101.0, 99.0, 102.0, 100.0],
    )])
    .unwrap();
    let (_, pseudo) = fit_marginals(&series).unwrap();
    assert!(pseudo.iter().all(|&u| u > 0.0 && u <= 1.0));
  }

  #[test]
  fn nan_uniform_contributes_nothing_to_the_cumulative_sum() {
    let p = params();
    let mut uniforms = Array2::<f64>::from_elem((3, 2), 0.5);
    uniforms[[1, 0]] = f64::NAN;

    let path = price_path_from_uniforms(&p, &uniforms);
    assert!(path.iter().all(|v| v.is_finite() && *v > 0.0));

    // Step 1 repeats step 0 for the poisoned security: zero increment.
    let r0 = (path[[1, 0]] / path[[0, 0]]).ln();
    assert!(r0.abs() < 1e-12);
  }
}
