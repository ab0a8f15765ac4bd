//! # Student-t Copula Model
//!
//! $$
//! T=\frac{Lz}{\sqrt{G/\nu}},\qquad U=t_\nu(T)
//! $$
//!
//! Empirical marginals joined by a Student-t dependence structure. The
//! correlation comes from Kendall's tau (robust in heavy tails) and the
//! shared chi-square mixing variable gives joint tail events a weight the
//! Gaussian copula cannot produce.

use ndarray::Array1;
use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand_distr::ChiSquared;
use rand_distr::Distribution;
use rand_distr::StandardNormal;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::StudentsT;

use crate::dependence::kendall_dependence;
use crate::error::Result;
use crate::history::HistoricalSeries;
use crate::model::check_num_steps;
use crate::model::copula::fit_marginals;
use crate::model::copula::price_path_from_uniforms;
use crate::model::copula::CopulaParams;
use crate::model::ModelState;
use crate::model::StochasticModel;

#[derive(Debug)]
pub struct TCopula {
  state: ModelState<CopulaParams>,
  dof: f64,
}

impl TCopula {
  /// A t copula with the given degrees of freedom. Lower `dof` means
  /// heavier joint tails; the Gaussian copula is the `dof -> inf` limit.
  pub fn new(dof: f64) -> Self {
    assert!(
      dof.is_finite() && dof > 0.0,
      "degrees of freedom must be positive, got {dof}"
    );
    Self {
      state: ModelState::Uninitialized,
      dof,
    }
  }

  pub fn dof(&self) -> f64 {
    self.dof
  }

  pub fn params(&self) -> Result<&CopulaParams> {
    self.state.params()
  }

  fn fit(historical: &HistoricalSeries) -> Result<CopulaParams> {
    let (marginals, pseudo) = fit_marginals(historical)?;
    let dependence = kendall_dependence(&pseudo)?;
    Ok(CopulaParams {
      marginals,
      dependence,
      x0: historical.last_prices(),
    })
  }

  /// Correlated uniforms for `num_steps` rows. Each row shares one
  /// chi-square mixing draw across all securities, which is exactly what
  /// makes the row multivariate t rather than per-component t.
  fn draw_uniforms(
    &self,
    params: &CopulaParams,
    num_steps: usize,
    rng: &mut StdRng,
  ) -> Array2<f64> {
    let t_dist = StudentsT::new(0.0, 1.0, self.dof).unwrap();
    let chi = ChiSquared::new(self.dof).unwrap();
    let n = params.dependence.dim();

    let mut uniforms = Array2::<f64>::zeros((num_steps, n));
    for t in 0..num_steps {
      let z: Array1<f64> = Array1::random_using(n, StandardNormal, rng);
      let y = params.dependence.correlate(&z);
      let g: f64 = chi.sample(rng);
      let scale = (self.dof / g).sqrt();
      for j in 0..n {
        uniforms[[t, j]] = t_dist.cdf(y[j] * scale);
      }
    }
    uniforms
  }
}

impl StochasticModel for TCopula {
  fn name(&self) -> &'static str {
    "t-copula"
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
    let uniforms = self.draw_uniforms(params, num_steps, rng);
    Ok(price_path_from_uniforms(params, &uniforms))
  }

  /// Terminal row of a full simulated path, mirroring the Gaussian copula
  /// jump semantics.
  fn simulate_jump(&self, num_steps: usize, rng: &mut StdRng) -> Result<Array1<f64>> {
    let path = self.simulate_path(num_steps, rng)?;
    Ok(path.row(path.nrows() - 1).to_owned())
  }
}

#[cfg(test)]
mod tests {
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  use super::TCopula;
  use crate::history::HistoricalSeries;
  use crate::model::StochasticModel;

  fn calibrated(dof: f64) -> TCopula {
    let series = HistoricalSeries::from_columns(vec![
      (
        "A".to_string(),
        vec![
          100.0, 101.0, 99.0, 102.0, 100.0, 103.0, 101.5, 104.0, 102.0, 105.0, 103.0, 106.5,
        ],
      ),
      (
        "B".to_string(),
        vec![
          50.0, 50.5, 49.8, 51.0, 50.2, 51.5, 50.7, 52.0, 51.0, 52.5, 51.5, 53.2,
        ],
      ),
    ])
    .unwrap();
    let mut model = TCopula::new(dof);
    model.add_historical(series);
    model.calibrate().unwrap();
    model
  }

  #[test]
  fn path_has_requested_shape_and_positive_prices() {
    let model = calibrated(4.0);
    let mut rng = StdRng::seed_from_u64(17);
    let path = model.simulate_path(10, &mut rng).unwrap();

    assert_eq!(path.dim(), (10, 2));
    assert!(path.iter().all(|&p| p > 0.0 && p.is_finite()));
  }

  #[test]
  fn fixed_seed_reproduces_the_path_exactly() {
    let model = calibrated(4.0);
    let a = model.simulate_path(6, &mut StdRng::seed_from_u64(2)).unwrap();
    let b = model.simulate_path(6, &mut StdRng::seed_from_u64(2)).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn jump_is_the_terminal_row_of_a_path() {
    let model = calibrated(6.0);
    let jump = model
      .simulate_jump(4, &mut StdRng::seed_from_u64(23))
      .unwrap();
    let path = model
      .simulate_path(4, &mut StdRng::seed_from_u64(23))
      .unwrap();
    assert_eq!(jump, path.row(3).to_owned());
  }

  #[test]
  #[should_panic(expected = "degrees of freedom must be positive")]
  fn zero_dof_is_rejected() {
    let _ = TCopula::new(0.0);
  }

  #[test]
  fn dependence_comes_from_the_rank_estimator() {
    // Both securities trend together, so the tau-bridged correlation has
    // to be strongly positive.
    let model = calibrated(4.0);
    let corr = model.params().unwrap().dependence.correlation();
    assert!(corr[[0, 1]] > 0.5, "rank correlation: {}", corr[[0, 1]]);
  }
}
