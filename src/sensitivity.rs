use ndarray::Array1;

use crate::config::MrConfig;
use crate::egger::{MIN_INSTRUMENTS as EGGER_MIN, egger_regression};
use crate::error::{MrError, Result};
use crate::ivw::{MIN_INSTRUMENTS as IVW_MIN, ivw_fit};
use crate::qc::check_instruments;
use crate::ratio::wald_ratios;
use crate::regression::weighted_linear_regression;
use crate::runner::{method_rng, run_method};
use crate::stats::{normal_cdf, pchisq_upper, t_pvalue};
use crate::types::{EstimateResult, HarmonizedTable, Method};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heterogeneity {
    pub q: f64,
    pub df: usize,
    pub pval: f64,
    /// Share of variability due to heterogeneity, in percent.
    pub i_squared: f64,
}

pub fn heterogeneity(table: &HarmonizedTable, config: &MrConfig) -> Result<Heterogeneity> {
    config.validate()?;
    let ratios = wald_ratios(table, config.second_order_weights);
    check_instruments("heterogeneity", ratios.len(), IVW_MIN, config.min_instruments)?;
    let fit = ivw_fit(&ratios.ratios, false);
    if !fit.zero_se.is_empty() {
        return Err(MrError::InvalidArgument(format!(
            "Cochran's Q is undefined with zero ratio standard errors ({})",
            fit.zero_se.join(",")
        )));
    }
    Ok(Heterogeneity {
        q: fit.q,
        df: fit.df,
        pval: pchisq_upper(fit.q, fit.df as f64),
        i_squared: i_squared(fit.q, fit.df),
    })
}

fn i_squared(q: f64, df: usize) -> f64 {
    if q > 0.0 {
        ((q - df as f64) / q * 100.0).max(0.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuckerQ {
    pub q_ivw: f64,
    pub q_egger: f64,
    pub q_diff: f64,
    pub pval: f64,
    pub pleiotropy_detected: bool,
}

/// Rücker's comparison of the IVW and MR-Egger residual heterogeneity.
pub fn rucker_q(table: &HarmonizedTable, config: &MrConfig) -> Result<RuckerQ> {
    let het = heterogeneity(table, config)?;
    check_instruments("rucker_q", table.len(), EGGER_MIN, config.min_instruments)?;
    let egger = egger_regression(table, config)?;
    let q_diff = het.q - egger.rss;
    let pval = if q_diff > 0.0 {
        pchisq_upper(q_diff, 1.0)
    } else {
        1.0
    };
    Ok(RuckerQ {
        q_ivw: het.q,
        q_egger: egger.rss,
        q_diff,
        pval,
        pleiotropy_detected: pval < config.significance_level,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOneOutRow {
    pub excluded_id: String,
    pub excluded_index: usize,
    pub result: Result<EstimateResult>,
}

/// Re-runs `method` once per variant with that variant removed.
pub fn leave_one_out(
    table: &HarmonizedTable,
    method: Method,
    config: &MrConfig,
) -> Result<Vec<LeaveOneOutRow>> {
    config.validate()?;
    Ok(table
        .variants()
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let mut rng = method_rng(config.seed, method);
            LeaveOneOutRow {
                excluded_id: v.id.clone(),
                excluded_index: i,
                result: run_method(method, &table.without(i), config, &mut rng),
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleVariantRow {
    pub id: String,
    pub result: EstimateResult,
}

/// Wald-ratio estimate of every variant on its own.
pub fn single_variant(table: &HarmonizedTable, config: &MrConfig) -> Vec<SingleVariantRow> {
    wald_ratios(table, config.second_order_weights)
        .ratios
        .into_iter()
        .map(|r| SingleVariantRow {
            result: EstimateResult::new(Method::WaldRatio, r.ratio, r.se, 1),
            id: r.id,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunnelPoint {
    pub id: String,
    pub ratio: f64,
    pub precision: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunnelAsymmetry {
    pub points: Vec<FunnelPoint>,
    /// Intercept of the standardized ratio regressed on precision.
    pub intercept: f64,
    pub intercept_se: f64,
    pub pval: f64,
}

/// Egger's regression test for funnel-plot asymmetry.
pub fn funnel_asymmetry(table: &HarmonizedTable, config: &MrConfig) -> Result<FunnelAsymmetry> {
    config.validate()?;
    let ratios = wald_ratios(table, config.second_order_weights);
    check_instruments("funnel_asymmetry", ratios.len(), 3, config.min_instruments)?;
    if ratios.ratios.iter().any(|r| r.se <= 0.0) {
        return Err(MrError::InvalidArgument(
            "funnel asymmetry requires positive ratio standard errors".to_string(),
        ));
    }

    let points: Vec<FunnelPoint> = ratios
        .ratios
        .iter()
        .map(|r| FunnelPoint {
            id: r.id.clone(),
            ratio: r.ratio,
            precision: 1.0 / r.se,
        })
        .collect();

    let x = Array1::from_iter(points.iter().map(|p| p.precision));
    let y = Array1::from_iter(ratios.ratios.iter().map(|r| r.ratio / r.se));
    let w = Array1::ones(x.len());
    let fit = weighted_linear_regression(&x, &y, &w)?;
    let intercept_se = fit.intercept_se_unscaled * fit.residual_variance().sqrt();

    Ok(FunnelAsymmetry {
        points,
        intercept: fit.intercept,
        intercept_se,
        pval: t_pvalue(fit.intercept / intercept_se, fit.df),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SteigerVariant {
    pub id: String,
    pub r2_exp: f64,
    pub r2_out: f64,
    pub correct_direction: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SteigerResult {
    pub variants: Vec<SteigerVariant>,
    pub r2_exp_total: f64,
    pub r2_out_total: f64,
    pub z: f64,
    pub pval: f64,
    pub direction_correct: bool,
    /// Variants that explain more variance in the exposure than the outcome.
    pub filtered: HarmonizedTable,
}

fn variance_explained(beta: f64, se: f64, n: f64) -> f64 {
    let b2 = beta * beta;
    b2 / (b2 + se * se * n)
}

fn fisher_z(r2: f64) -> f64 {
    let r = r2.clamp(0.0, 1.0).sqrt();
    0.5 * ((1.0 + r) / (1.0 - r + 1e-10)).ln()
}

/// Steiger directionality test and filter.
pub fn steiger_filtering(
    table: &HarmonizedTable,
    n_exp: usize,
    n_out: usize,
    r2_threshold: f64,
) -> Result<SteigerResult> {
    if n_exp <= 3 || n_out <= 3 {
        return Err(MrError::InvalidArgument(format!(
            "Steiger filtering requires sample sizes above 3, got {n_exp} and {n_out}"
        )));
    }
    if !r2_threshold.is_finite() || r2_threshold < 0.0 {
        return Err(MrError::InvalidArgument(format!(
            "Value of r2_threshold should be non-negative, got {r2_threshold}"
        )));
    }

    let (ne, no) = (n_exp as f64, n_out as f64);
    let mut keep = Vec::new();
    let variants: Vec<SteigerVariant> = table
        .variants()
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let r2_exp = variance_explained(v.beta_exp, v.se_exp, ne);
            let r2_out = variance_explained(v.beta_out, v.se_out, no);
            let correct_direction = r2_exp > r2_out + r2_threshold;
            if correct_direction {
                keep.push(i);
            }
            SteigerVariant {
                id: v.id.clone(),
                r2_exp,
                r2_out,
                correct_direction,
            }
        })
        .collect();

    let r2_exp_total: f64 = variants.iter().map(|v| v.r2_exp).sum();
    let r2_out_total: f64 = variants.iter().map(|v| v.r2_out).sum();
    let z = (fisher_z(r2_exp_total) - fisher_z(r2_out_total))
        / (1.0 / (ne - 3.0) + 1.0 / (no - 3.0)).sqrt();
    let pval = 2.0 * (1.0 - normal_cdf(z.abs()));

    Ok(SteigerResult {
        variants,
        r2_exp_total,
        r2_out_total,
        z,
        pval,
        direction_correct: r2_exp_total > r2_out_total,
        filtered: table.subset(&keep),
    })
}
