//! # Gaussian Copula Model
//!
//! $$
//! U=\Phi(Lz),\qquad r_i=F_i^{-1}(U_i)
//! $$
//!
//! Empirical marginals joined by a Gaussian dependence structure estimated
//! from normal-quantile-transformed pseudo-observations.

use ndarray::Array1;
use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;

use crate::dependence::gaussian_dependence;
use crate::error::Result;
use crate::history::HistoricalSeries;
use crate::model::check_num_steps;
use crate::model::copula::fit_marginals;
use crate::model::copula::price_path_from_uniforms;
use crate::model::copula::CopulaParams;
use crate::model::ModelState;
use crate::model::StochasticModel;

#[derive(Debug, Default)]
pub struct GaussianCopula {
  state: ModelState<CopulaParams>,
}

impl GaussianCopula {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn params(&self) -> Result<&CopulaParams> {
    self.state.params()
  }

  fn fit(historical: &HistoricalSeries) -> Result<CopulaParams> {
    let (marginals, pseudo) = fit_marginals(historical)?;
    let dependence = gaussian_dependence(&pseudo)?;
    Ok(CopulaParams {
      marginals,
      dependence,
      x0: historical.last_prices(),
    })
  }

  /// Correlated uniforms for `num_steps` rows: `Phi(L z)` per row.
  fn draw_uniforms(
    params: &CopulaParams,
    num_steps: usize,
    rng: &mut StdRng,
  ) -> Array2<f64> {
    let std_norm = Normal::new(0.0, 1.0).unwrap();
    let n = params.dependence.dim();
    let mut uniforms = Array2::<f64>::zeros((num_steps, n));
    for t in 0..num_steps {
      let z: Array1<f64> = Array1::random_using(n, StandardNormal, rng);
      let y = params.dependence.correlate(&z);
      for j in 0..n {
        uniforms[[t, j]] = std_norm.cdf(y[j]);
      }
    }
    uniforms
  }
}

impl StochasticModel for GaussianCopula {
  fn name(&self) -> &'static str {
    "gaussian-copula"
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

  fn simulate_path(&self, num_steps: usize, rng: &mut StdRng) -> Result<Array2<f64>> {
    check_num_steps(num_steps)?;
    let params = self.state.params()?;
    let uniforms = Self::draw_uniforms(params, num_steps, rng);
    Ok(price_path_from_uniforms(params, &uniforms))
  }

  /// Terminal row of a full simulated path. Empirical increments have no
  /// closed-form horizon scaling, so the jump walks the whole path and
  /// keeps only its last row.
  fn simulate_jump(&self, num_steps: usize, rng: &mut StdRng) -> Result<Array1<f64>> {
    let path = self.simulate_path(num_steps, rng)?;
    Ok(path.row(path.nrows() - 1).to_owned())
  }
}
