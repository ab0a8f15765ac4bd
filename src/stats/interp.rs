//! # Monotone Interpolation
//!
//! $$
//! f^{-1}(y)\approx x_i+\frac{y-f(x_i)}{f(x_{i+1})-f(x_i)}(x_{i+1}-x_i)
//! $$
//!
//! Piecewise-linear inversion of a sampled monotone function. The inverse
//! of an empirical CDF is the main client, but nothing here assumes the
//! input is a distribution function.

use crate::error::Result;
use crate::error::RiskyError;

/// Piecewise-linear interpolant over `(x, y)` knots sorted by `x`,
/// extrapolating linearly from the two nearest boundary knots outside the
/// observed range.
#[derive(Clone, Debug)]
pub struct MonotoneInterp {
  xs: Vec<f64>,
  ys: Vec<f64>,
}

impl MonotoneInterp {
  /// Build an interpolant from unordered knots. Knots are stable-sorted by
  /// the `x` coordinate; exactly duplicated knots collapse to one.
  pub fn new(mut points: Vec<(f64, f64)>) -> Result<Self> {
    points.retain(|(x, y)| x.is_finite() && y.is_finite());
    points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    points.dedup_by(|a, b| a.0 == b.0 && a.1 == b.1);

    if points.len() < 2 {
      return Err(RiskyError::InsufficientData(format!(
        "interpolation needs at least 2 distinct knots, got {}",
        points.len()
      )));
    }

    let (xs, ys) = points.into_iter().unzip();
    Ok(Self { xs, ys })
  }

  /// Evaluate the interpolant at `x`.
  pub fn eval(&self, x: f64) -> f64 {
    let n = self.xs.len();

    // Segment whose left knot is the last x-coordinate <= x; the two
    // boundary segments double as extrapolation lines.
    let seg = match self.xs.partition_point(|&k| k <= x) {
      0 => 0,
      p if p >= n => n - 2,
      p => p - 1,
    };

    let (x0, x1) = (self.xs[seg], self.xs[seg + 1]);
    let (y0, y1) = (self.ys[seg], self.ys[seg + 1]);
    if x1 == x0 {
      return y0;
    }
    y0 + (x - x0) / (x1 - x0) * (y1 - y0)
  }
}

/// Invert a monotone function sampled as `(x_i, f(x_i))` pairs.
///
/// The returned interpolant maps function values back to arguments; it is
/// monotone whenever the input sample is, and no monotonicity check is
/// performed on the forward function itself.
pub fn invert_monotone(xs: &[f64], fs: &[f64]) -> Result<MonotoneInterp> {
  if xs.len() != fs.len() {
    return Err(RiskyError::InvalidInput(format!(
      "argument and value slices differ in length: {} vs {}",
      xs.len(),
      fs.len()
    )));
  }
  MonotoneInterp::new(fs.iter().copied().zip(xs.iter().copied()).collect())
}
