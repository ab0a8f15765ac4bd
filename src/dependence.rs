//! # Dependence
//!
//! $$
//! \rho_{ij}=\sin\!\left(\frac{\pi}{2}\tau_{ij}\right)
//! $$
//!
//! Correlation-structure estimators over pseudo-observations, decoupled
//! from the marginal models that produce them. Both estimators return the
//! same [`DependenceParameters`] object, so a copula model can swap its
//! dependence estimator without touching its marginals.

use std::cmp::Ordering;
use std::f64::consts::PI;

use ndarray::Array1;
use ndarray::Array2;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;
use tracing::debug;

use crate::error::Result;
use crate::error::RiskyError;

/// A correlation matrix together with its lower Cholesky factor.
/// Rebuilt whole at every calibration, never mutated in place.
#[derive(Clone, Debug)]
pub struct DependenceParameters {
  correlation: Array2<f64>,
  cholesky: Array2<f64>,
}

impl DependenceParameters {
  /// Validate a correlation-like matrix and factorize it. A matrix that is
  /// not positive definite is a calibration failure the caller must see.
  pub fn from_correlation(correlation: Array2<f64>) -> Result<Self> {
    if correlation.nrows() != correlation.ncols() || correlation.nrows() == 0 {
      return Err(RiskyError::Calibration(format!(
        "correlation matrix must be square and non-empty, got {}x{}",
        correlation.nrows(),
        correlation.ncols()
      )));
    }

    let cholesky = cholesky_lower(&correlation)?;
    Ok(Self {
      correlation,
      cholesky,
    })
  }

  pub fn dim(&self) -> usize {
    self.correlation.nrows()
  }

  pub fn correlation(&self) -> &Array2<f64> {
    &self.correlation
  }

  /// Lower triangular `L` with `L L^T` equal to the correlation matrix.
  pub fn cholesky(&self) -> &Array2<f64> {
    &self.cholesky
  }

  /// Correlate an independent standard-normal vector: `L z`.
  pub fn correlate(&self, z: &Array1<f64>) -> Array1<f64> {
    self.cholesky.dot(z)
  }
}

/// Lower Cholesky factor of a symmetric positive-definite matrix.
///
/// Shared by the correlation estimators here and the parametric model's
/// covariance factorization.
pub fn cholesky_lower(matrix: &Array2<f64>) -> Result<Array2<f64>> {
  let d = matrix.nrows();
  let slice = matrix.as_slice().ok_or_else(|| {
    RiskyError::Calibration("matrix is not contiguous in memory".to_string())
  })?;

  let na = nalgebra::DMatrix::from_row_slice(d, d, slice);
  let chol = na
    .cholesky()
    .ok_or_else(|| RiskyError::Calibration("matrix is not positive definite".to_string()))?;

  let l = chol.l();
  let mut lower = Array2::<f64>::zeros((d, d));
  for i in 0..d {
    for j in 0..=i {
      lower[[i, j]] = l[(i, j)];
    }
  }
  Ok(lower)
}

/// Gaussian dependence estimator.
///
/// Maps pseudo-observations through the standard-normal quantile, drops
/// any row containing a non-finite value (probabilities of exactly 0 or 1
/// map to infinities), and takes the Pearson correlation of what remains.
pub fn gaussian_dependence(pseudo: &Array2<f64>) -> Result<DependenceParameters> {
  let std_norm = Normal::new(0.0, 1.0).unwrap();
  let transformed = pseudo.mapv(|u| std_norm.inverse_cdf(u));

  let rows: Vec<usize> = (0..transformed.nrows())
    .filter(|&t| transformed.row(t).iter().all(|v| v.is_finite()))
    .collect();
  if rows.len() < 2 {
    return Err(RiskyError::InsufficientData(format!(
      "only {} complete rows survive the normal-quantile transform",
      rows.len()
    )));
  }
  debug!(
    kept = rows.len(),
    dropped = transformed.nrows() - rows.len(),
    "gaussian dependence estimation"
  );

  let n = transformed.ncols();
  let mut corr = Array2::<f64>::eye(n);
  for i in 0..n {
    for j in (i + 1)..n {
      let xi: Vec<f64> = rows.iter().map(|&t| transformed[[t, i]]).collect();
      let xj: Vec<f64> = rows.iter().map(|&t| transformed[[t, j]]).collect();
      let r = pearson(&xi, &xj);
      corr[[i, j]] = r;
      corr[[j, i]] = r;
    }
  }

  DependenceParameters::from_correlation(corr)
}

/// Rank dependence estimator for heavy-tailed data.
///
/// Pairwise Kendall's tau-b over the pseudo-observations, bridged to a
/// linear correlation via `rho = sin(pi/2 tau)`.
pub fn kendall_dependence(pseudo: &Array2<f64>) -> Result<DependenceParameters> {
  if pseudo.nrows() < 2 {
    return Err(RiskyError::InsufficientData(format!(
      "Kendall's tau needs at least 2 observations, got {}",
      pseudo.nrows()
    )));
  }

  let n = pseudo.ncols();
  let mut corr = Array2::<f64>::eye(n);
  for i in 0..n {
    for j in (i + 1)..n {
      let ui = pseudo.column(i).to_vec();
      let uj = pseudo.column(j).to_vec();
      let (tau, ..) = kendalls::tau_b_with_comparator(&ui, &uj, |a, b| {
        a.partial_cmp(b).unwrap_or(Ordering::Greater)
      })
      .map_err(|e| RiskyError::Calibration(format!("Kendall's tau failed: {e}")))?;

      let r = (PI * 0.5 * tau).sin();
      corr[[i, j]] = r;
      corr[[j, i]] = r;
    }
  }

  DependenceParameters::from_correlation(corr)
}

fn sample_mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.iter().sum::<f64>() / xs.len() as f64
  }
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
  let n = x.len().min(y.len());
  if n < 2 {
    return 0.0;
  }

  let mx = sample_mean(x);
  let my = sample_mean(y);

  let mut cov = 0.0;
  let mut sx = 0.0;
  let mut sy = 0.0;
  for i in 0..n {
    let dx = x[i] - mx;
    let dy = y[i] - my;
    cov += dx * dy;
    sx += dx * dx;
    sy += dy * dy;
  }

  let denom2 = sx * sy;
  if denom2 < 1e-30 {
    return 0.0;
  }
  // Collinear columns must come out at exactly +-1 so the Cholesky step
  // rejects them instead of passing on a barely positive pivot.
  if cov * cov >= denom2 {
    return 1.0_f64.copysign(cov);
  }
  (cov / denom2.sqrt()).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use ndarray::Array2;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;

  use super::cholesky_lower;
  use super::gaussian_dependence;
  use super::kendall_dependence;
  use crate::error::RiskyError;

  /// Pseudo-observations of two series with positive dependence plus an
  /// independent third column.
  fn correlated_pseudo(rows: usize, seed: u64) -> Array2<f64> {
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut raw = Array2::<f64>::zeros((rows, 3));
    for t in 0..rows {
      let common: f64 = normal.sample(&mut rng);
      raw[[t, 0]] = common + 0.3 * normal.sample(&mut rng);
      raw[[t, 1]] = common + 0.3 * normal.sample(&mut rng);
      raw[[t, 2]] = normal.sample(&mut rng);
    }

    // Rank-transform each column to (0, 1].
    let mut pseudo = Array2::<f64>::zeros((rows, 3));
    for j in 0..3 {
      let col = raw.column(j);
      for t in 0..rows {
        let rank = col.iter().filter(|&&v| v <= col[t]).count();
        pseudo[[t, j]] = rank as f64 / rows as f64;
      }
    }
    pseudo
  }

  #[test]
  fn cholesky_reconstructs_the_input() {
    let m = ndarray::array![[4.0, 2.0], [2.0, 3.0]];
    let l = cholesky_lower(&m).unwrap();
    let back = l.dot(&l.t());
    for i in 0..2 {
      for j in 0..2 {
        assert_relative_eq!(back[[i, j]], m[[i, j]], epsilon = 1e-12);
      }
    }
    assert_relative_eq!(l[[0, 1]], 0.0);
  }

  #[test]
  fn gaussian_estimate_is_a_valid_correlation() {
    let dep = gaussian_dependence(&correlated_pseudo(400, 5)).unwrap();
    let corr = dep.correlation();

    for i in 0..dep.dim() {
      assert_relative_eq!(corr[[i, i]], 1.0);
      for j in 0..dep.dim() {
        assert_relative_eq!(corr[[i, j]], corr[[j, i]], epsilon = 1e-12);
        assert!(corr[[i, j]].abs() <= 1.0 + 1e-12);
      }
    }
    assert!(corr[[0, 1]] > 0.6, "dependent pair: {}", corr[[0, 1]]);
    assert!(corr[[0, 2]].abs() < 0.25, "independent pair: {}", corr[[0, 2]]);
  }

  #[test]
  fn kendall_estimate_recovers_the_dependence_sign() {
    let dep = kendall_dependence(&correlated_pseudo(400, 9)).unwrap();
    let corr = dep.correlation();
    assert!(corr[[0, 1]] > 0.6);
    assert!(corr[[0, 2]].abs() < 0.25);
    for i in 0..dep.dim() {
      assert_relative_eq!(corr[[i, i]], 1.0);
    }
  }

  #[test]
  fn both_estimators_roughly_agree() {
    let pseudo = correlated_pseudo(600, 21);
    let g = gaussian_dependence(&pseudo).unwrap();
    let k = kendall_dependence(&pseudo).unwrap();
    assert_relative_eq!(
      g.correlation()[[0, 1]],
      k.correlation()[[0, 1]],
      epsilon = 0.1
    );
  }

  #[test]
  fn collinear_input_fails_calibration() {
    let rows = 50;
    let mut pseudo = Array2::<f64>::zeros((rows, 2));
    for t in 0..rows {
      let u = (t + 1) as f64 / rows as f64;
      pseudo[[t, 0]] = u;
      pseudo[[t, 1]] = u;
    }

    let err = kendall_dependence(&pseudo).unwrap_err();
    assert!(matches!(err, RiskyError::Calibration(_)));
    let err = gaussian_dependence(&pseudo).unwrap_err();
    assert!(matches!(err, RiskyError::Calibration(_)));
  }

  #[test]
  fn boundary_probabilities_are_dropped_not_fatal() {
    // Every row with u = 1.0 maps to +inf and must be discarded.
    let dep = gaussian_dependence(&correlated_pseudo(100, 33)).unwrap();
    assert!(dep.correlation().iter().all(|v| v.is_finite()));
  }
}
