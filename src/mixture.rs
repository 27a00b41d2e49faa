//! Contamination mixture over a grid of candidate effects.

use tracing::{debug, warn};

use crate::config::MrConfig;
use crate::error::{MrError, Result};
use crate::ivw::ivw_fit;
use crate::qc::check_instruments;
use crate::ratio::{WaldRatio, wald_ratios};
use crate::stats::{normal_log_density, qchisq, quantile, sample_sd};
use crate::types::{EstimateResult, EstimateWarning, HarmonizedTable, Method};

pub const MIN_INSTRUMENTS: usize = 3;
const EM_MAX_ITER: usize = 200;
const EM_TOLERANCE: f64 = 1e-9;
const PROPORTION_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct MixtureFit {
    pub estimate: EstimateResult,
    /// Disjoint pieces of the confidence region, in increasing order.
    pub intervals: Vec<(f64, f64)>,
    /// `(beta, log-likelihood)` for every grid point.
    pub profile: Vec<(f64, f64)>,
    /// Posterior probability that each variant is valid, at the estimate.
    pub valid_probability: Vec<(String, f64)>,
    /// Fitted proportion of valid instruments at the estimate.
    pub valid_proportion: f64,
    /// Spread of the invalid-instrument component.
    pub psi: f64,
    pub truncated: bool,
}

struct GridPoint {
    loglik: f64,
    proportion: f64,
    responsibilities: Vec<f64>,
}

fn log_add(a: f64, b: f64) -> f64 {
    let m = a.max(b);
    if m == f64::NEG_INFINITY {
        return m;
    }
    m + ((a - m).exp() + (b - m).exp()).ln()
}

fn profile_point(ratios: &[WaldRatio], beta: f64, psi: f64, prior: f64) -> GridPoint {
    let log_valid: Vec<f64> = ratios
        .iter()
        .map(|r| normal_log_density(r.ratio, beta, r.se))
        .collect();
    let log_invalid: Vec<f64> = ratios
        .iter()
        .map(|r| normal_log_density(r.ratio, 0.0, (psi * psi + r.se * r.se).sqrt()))
        .collect();

    let n = ratios.len() as f64;
    let mut proportion = prior;
    let mut responsibilities = vec![0.0; ratios.len()];
    for _ in 0..EM_MAX_ITER {
        let lp = proportion.ln();
        let lq = (1.0 - proportion).ln();
        for (j, resp) in responsibilities.iter_mut().enumerate() {
            let a = lp + log_valid[j];
            let b = lq + log_invalid[j];
            *resp = (a - log_add(a, b)).exp();
        }
        let updated = (responsibilities.iter().sum::<f64>() / n)
            .clamp(PROPORTION_FLOOR, 1.0 - PROPORTION_FLOOR);
        let delta = (updated - proportion).abs();
        proportion = updated;
        if delta.is_nan() || delta <= EM_TOLERANCE {
            break;
        }
    }

    let lp = proportion.ln();
    let lq = (1.0 - proportion).ln();
    let loglik = log_valid
        .iter()
        .zip(&log_invalid)
        .map(|(&v, &i)| log_add(lp + v, lq + i))
        .sum();

    GridPoint {
        loglik,
        proportion,
        responsibilities,
    }
}

fn intervals_from_mask(grid: &[f64], keep: &[bool]) -> Vec<(f64, f64)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &k) in keep.iter().enumerate() {
        match (k, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((grid[s], grid[i - 1]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((grid[s], grid[grid.len() - 1]));
    }
    out
}

pub fn contamination_mixture(table: &HarmonizedTable, config: &MrConfig) -> Result<MixtureFit> {
    config.validate()?;
    let ratios = wald_ratios(table, config.second_order_weights);
    check_instruments(
        "contamination_mixture",
        ratios.len(),
        MIN_INSTRUMENTS,
        config.min_instruments,
    )?;

    let values = ratios.values();
    let psi = config.invalid_sd_multiplier * sample_sd(&values);
    let center = ivw_fit(&ratios.ratios, true);
    let median = quantile(&values, 0.5);
    let mut half_width = config.grid_width * center.se;
    if !(half_width.is_finite() && half_width > 0.0) {
        half_width = config.grid_width * sample_sd(&values);
    }
    let lower = (center.beta - half_width).min(median - half_width);
    let upper = (center.beta + half_width).max(median + half_width);
    if !(lower.is_finite() && upper.is_finite() && upper > lower) {
        return Err(MrError::EmptyConfidenceRegion(format!(
            "cannot build a search grid around {} (ratios have no spread)",
            center.beta
        )));
    }

    let steps = config.grid_resolution - 1;
    let grid: Vec<f64> = (0..=steps)
        .map(|i| lower + (upper - lower) * i as f64 / steps as f64)
        .collect();
    debug!(
        "contamination mixture: grid [{lower:.4}, {upper:.4}] with {} points, psi = {psi:.4}",
        grid.len()
    );

    let points: Vec<GridPoint> = grid
        .iter()
        .map(|&b| profile_point(&ratios.ratios, b, psi, config.valid_proportion))
        .collect();

    let best = points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.loglik.is_finite())
        .max_by(|(_, a), (_, b)| a.loglik.total_cmp(&b.loglik))
        .map(|(i, _)| i);
    let Some(best) = best else {
        return Err(MrError::EmptyConfidenceRegion(
            "no grid point has a finite likelihood".to_string(),
        ));
    };

    let max_loglik = points[best].loglik;
    let cutoff = max_loglik - qchisq(1.0 - config.significance_level, 1.0) / 2.0;
    let keep: Vec<bool> = points
        .iter()
        .map(|p| p.loglik.is_finite() && p.loglik >= cutoff)
        .collect();
    let intervals = intervals_from_mask(&grid, &keep);
    if intervals.is_empty() {
        return Err(MrError::EmptyConfidenceRegion(format!(
            "no grid point within the likelihood cutoff {cutoff}"
        )));
    }
    let truncated = keep[0] || keep[keep.len() - 1];

    let beta = grid[best];
    let outer_lo = intervals[0].0;
    let outer_hi = intervals[intervals.len() - 1].1;
    let se = (outer_hi - outer_lo) / (2.0 * config.z_critical());

    let mut estimate = EstimateResult::new(Method::ContaminationMixture, beta, se, ratios.len());
    if truncated {
        warn!("contamination mixture: confidence region reaches the grid boundary");
        estimate = estimate.with_warning(EstimateWarning::GridTruncated);
    }
    if ratios.n_excluded > 0 {
        estimate = estimate.with_warning(EstimateWarning::ZeroExposureEffect {
            count: ratios.n_excluded,
        });
    }

    let valid_probability = ratios
        .ratios
        .iter()
        .zip(&points[best].responsibilities)
        .map(|(r, &p)| (r.id.clone(), p))
        .collect();

    Ok(MixtureFit {
        estimate,
        intervals,
        profile: grid
            .iter()
            .zip(&points)
            .map(|(&b, p)| (b, p.loglik))
            .collect(),
        valid_probability,
        valid_proportion: points[best].proportion,
        psi,
        truncated,
    })
}
