use ndarray::{ArrayView1, ScalarOperand};
use num_traits::{Float, FromPrimitive};
use serde::Serialize;

use crate::error::DegenerateInput;

/// The result of an ordinary least squares fit of `y = slope * x + intercept`
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LinearFit<E> {
    pub slope: E,
    pub intercept: E,
    /// Coefficient of determination, `1 - SS_res / SS_tot`
    pub r_squared: E,
    /// Number of points in the fit
    pub n: usize,
    /// Standard error of the slope, undefined for two points
    pub slope_std_error: Option<E>,
    /// Regression F-statistic on `(1, n - 2)` degrees of freedom
    ///
    /// `None` when there are no residual degrees of freedom or the fit is exact.
    pub f_statistic: Option<E>,
}

impl<E: Float> LinearFit<E> {
    pub fn predict(&self, x: E) -> E {
        self.slope.mul_add(x, self.intercept)
    }
}

/// Fit a straight line to paired samples by ordinary least squares
///
/// Uses the closed form
/// $$
///     m = \frac{\sum (x_i - \bar{x})(y_i - \bar{y})}{\sum (x_i - \bar{x})^2}, \quad b = \bar{y} - m \bar{x}
/// $$
///
/// Note the fit is not symmetric: `ols(x, y).slope * ols(y, x).slope` equals $R^2$, not unity.
///
/// # Errors
/// Returns an error when the inputs differ in length, contain fewer than two points, or either
/// variable has zero variance. A constant `y` is rejected because $R^2$ would be `0 / 0`.
///
/// # Examples
///
/// ```
/// use peat_trim::math::ols;
///
/// let x = [0., 1., 2., 3.];
/// let y = [3., 5., 7., 9.];
/// let fit = ols(&x, &y).unwrap();
///
/// approx::assert_relative_eq!(fit.slope, 2.0);
/// approx::assert_relative_eq!(fit.intercept, 3.0);
/// approx::assert_relative_eq!(fit.r_squared, 1.0);
/// ```
pub fn ols<E>(x: &[E], y: &[E]) -> Result<LinearFit<E>, DegenerateInput>
where
    E: Float + FromPrimitive + ScalarOperand,
{
    let n = x.len();
    if n != y.len() {
        return Err(DegenerateInput::LengthMismatch { x: n, y: y.len() });
    }
    if n < 2 {
        return Err(DegenerateInput::TooFewPoints(n));
    }

    let x = ArrayView1::from(x);
    let y = ArrayView1::from(y);
    let x_mean = x.mean().ok_or(DegenerateInput::TooFewPoints(n))?;
    let y_mean = y.mean().ok_or(DegenerateInput::TooFewPoints(n))?;

    let dx = x.mapv(|xi| xi - x_mean);
    let dy = y.mapv(|yi| yi - y_mean);

    let ss_x = dx.dot(&dx);
    if ss_x == E::zero() {
        return Err(DegenerateInput::ConstantX);
    }
    let ss_tot = dy.dot(&dy);
    if ss_tot == E::zero() {
        return Err(DegenerateInput::ConstantY);
    }

    let slope = dx.dot(&dy) / ss_x;
    let intercept = y_mean - slope * x_mean;

    let residuals = &y - &x.mapv(|xi| slope.mul_add(xi, intercept));
    let ss_res = residuals.dot(&residuals);
    let r_squared = E::one() - ss_res / ss_tot;

    let (slope_std_error, f_statistic) = match E::from_usize(n - 2) {
        Some(dof) if dof > E::zero() => {
            let mean_square_error = ss_res / dof;
            let standard_error = (mean_square_error / ss_x).sqrt();
            let f_statistic = (ss_res > E::zero()).then(|| (ss_tot - ss_res) / mean_square_error);
            (Some(standard_error), f_statistic)
        }
        _ => (None, None),
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_squared,
        n,
        slope_std_error,
        f_statistic,
    })
}
