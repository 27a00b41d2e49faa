use ndarray::Array1;

use crate::error::{MrError, Result};

const SINGULAR_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedFit {
    pub intercept: f64,
    pub slope: f64,
    /// Unscaled standard errors, i.e. assuming a residual variance of one.
    pub intercept_se_unscaled: f64,
    pub slope_se_unscaled: f64,
    /// Weighted residual sum of squares.
    pub rss: f64,
    pub df: f64,
}

impl WeightedFit {
    pub fn residual_variance(&self) -> f64 {
        if self.df > 0.0 {
            self.rss / self.df
        } else {
            f64::NAN
        }
    }
}

fn check_inputs(x: &Array1<f64>, y: &Array1<f64>, w: &Array1<f64>) -> Result<()> {
    if x.len() != y.len() || x.len() != w.len() {
        return Err(MrError::InvalidArgument(format!(
            "regression inputs differ in length: x={}, y={}, w={}",
            x.len(),
            y.len(),
            w.len()
        )));
    }
    if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(MrError::InvalidArgument(
            "regression weights must be finite and non-negative".to_string(),
        ));
    }
    Ok(())
}

/// Weighted least squares of `y` on `x` with an intercept.
pub fn weighted_linear_regression(
    x: &Array1<f64>,
    y: &Array1<f64>,
    w: &Array1<f64>,
) -> Result<WeightedFit> {
    check_inputs(x, y, w)?;

    let w_sum = w.sum();
    if w_sum <= 0.0 {
        return Err(MrError::SingularRegression(
            "total regression weight is zero".to_string(),
        ));
    }

    let x_mean = (x * w).sum() / w_sum;
    let y_mean = (y * w).sum() / w_sum;

    let cov_xy = ((x - x_mean) * (y - y_mean) * w).sum();
    let var_x = ((x - x_mean).mapv(|v| v * v) * w).sum();
    let scale = (x.mapv(|v| v * v) * w).sum();

    if !var_x.is_finite() || var_x <= SINGULAR_TOLERANCE * scale.max(f64::MIN_POSITIVE) {
        return Err(MrError::SingularRegression(format!(
            "weighted variance of the regressor is {var_x:e}"
        )));
    }

    let slope = cov_xy / var_x;
    let intercept = y_mean - slope * x_mean;

    let residuals = y - &(x * slope + intercept);
    let rss = (&residuals * &residuals * w).sum();

    Ok(WeightedFit {
        intercept,
        slope,
        intercept_se_unscaled: (1.0 / w_sum + x_mean.powi(2) / var_x).sqrt(),
        slope_se_unscaled: (1.0 / var_x).sqrt(),
        rss,
        df: x.len() as f64 - 2.0,
    })
}
