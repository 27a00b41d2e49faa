//! MR-Egger regression.

use ndarray::Array1;

use crate::config::MrConfig;
use crate::error::{MrError, Result};
use crate::qc::check_instruments;
use crate::regression::{WeightedFit, weighted_linear_regression};
use crate::stats::normal_pvalue;
use crate::types::{EstimateResult, HarmonizedTable, Method};

pub const MIN_INSTRUMENTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct EggerFit {
    /// Slope, i.e. the pleiotropy-robust causal estimate.
    pub estimate: EstimateResult,
    pub intercept: f64,
    pub intercept_se: f64,
    pub intercept_pval: f64,
    /// Square root of the weighted residual variance.
    pub residual_se: f64,
    /// Rücker's Q: weighted residual sum of squares around the fitted line.
    pub q: f64,
    pub q_df: usize,
}

/// Oriented exposure and outcome effects with the regression weights.
pub(crate) fn egger_inputs(
    table: &HarmonizedTable,
    second_order: bool,
) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    let n = table.len();
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    let mut w = Vec::with_capacity(n);
    for v in table.variants() {
        // Orient so the exposure effect is positive (InSIDE convention).
        let sign = if v.beta_exp < 0.0 { -1.0 } else { 1.0 };
        x.push(v.beta_exp * sign);
        y.push(v.beta_out * sign);
        let mut var = v.se_out * v.se_out;
        if second_order && v.beta_exp != 0.0 {
            let ratio = v.beta_out / v.beta_exp;
            var += ratio * ratio * v.se_exp * v.se_exp;
        }
        w.push(if var > 0.0 { 1.0 / var } else { f64::INFINITY });
    }
    (Array1::from(x), Array1::from(y), Array1::from(w))
}

pub(crate) fn egger_regression(table: &HarmonizedTable, config: &MrConfig) -> Result<WeightedFit> {
    let (x, y, w) = egger_inputs(table, config.second_order_weights);
    if let Some(i) = w.iter().position(|wi| !wi.is_finite()) {
        let v = &table.variants()[i];
        return Err(MrError::InvalidArgument(format!(
            "egger requires positive outcome variance; {} has se_out {}",
            v.id, v.se_out
        )));
    }
    weighted_linear_regression(&x, &y, &w)
}

pub fn mr_egger(table: &HarmonizedTable, config: &MrConfig) -> Result<EggerFit> {
    config.validate()?;
    check_instruments("egger", table.len(), MIN_INSTRUMENTS, config.min_instruments)?;

    let fit = egger_regression(table, config)?;
    let residual_se = fit.residual_variance().sqrt();
    let inflation = if residual_se.is_finite() {
        residual_se.max(1.0)
    } else {
        1.0
    };

    let slope_se = fit.slope_se_unscaled * inflation;
    let intercept_se = fit.intercept_se_unscaled * inflation;

    Ok(EggerFit {
        estimate: EstimateResult::new(Method::Egger, fit.slope, slope_se, table.len()),
        intercept: fit.intercept,
        intercept_se,
        intercept_pval: normal_pvalue(fit.intercept, intercept_se),
        residual_se,
        q: fit.rss,
        q_df: table.len() - 2,
    })
}
