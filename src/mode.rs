use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use tracing::debug;

use crate::config::MrConfig;
use crate::error::Result;
use crate::parallel::map_replicates;
use crate::qc::check_instruments;
use crate::ratio::{inverse_variance_weights, wald_ratios};
use crate::stats::{interquartile_range, sample_sd};
use crate::types::{EstimateResult, EstimateWarning, HarmonizedTable, Method};

pub const MIN_INSTRUMENTS: usize = 3;
const GRID_POINTS: usize = 512;

/// Silverman's rule scaled by `phi`. `None` when the ratios have no spread.
pub fn silverman_bandwidth(values: &[f64], phi: f64) -> Option<f64> {
    let n = values.len() as f64;
    let sd = sample_sd(values);
    let iqr = interquartile_range(values) / 1.34;
    let spread = if iqr > 0.0 { sd.min(iqr) } else { sd };
    let h = phi * 0.9 * spread * n.powf(-0.2);
    (h.is_finite() && h > 0.0).then_some(h)
}

/// Location of the maximum of a Gaussian KDE with normalized `weights`.
pub fn kde_mode(values: &[f64], weights: &[f64], bandwidth: f64) -> f64 {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let lo = lo - 3.0 * bandwidth;
    let hi = hi + 3.0 * bandwidth;
    let step = (hi - lo) / (GRID_POINTS - 1) as f64;

    let mut best = (f64::NEG_INFINITY, lo);
    for g in 0..GRID_POINTS {
        let x = lo + step * g as f64;
        let density: f64 = values
            .iter()
            .zip(weights)
            .map(|(&v, &w)| {
                let z = (x - v) / bandwidth;
                w * (-0.5 * z * z).exp()
            })
            .sum();
        if density > best.0 {
            best = (density, x);
        }
    }
    best.1
}

fn mode_estimate(
    method: Method,
    table: &HarmonizedTable,
    config: &MrConfig,
    rng: &mut StdRng,
) -> Result<EstimateResult> {
    config.validate()?;
    let ratios = wald_ratios(table, config.second_order_weights);
    check_instruments(method.name(), ratios.len(), MIN_INSTRUMENTS, config.min_instruments)?;

    let values = ratios.values();
    let ses = ratios.ses();
    let (raw_weights, zero_se) = match method {
        Method::WeightedMode => inverse_variance_weights(&ratios.ratios),
        _ => (vec![1.0; values.len()], Vec::new()),
    };
    let total: f64 = raw_weights.iter().sum();
    let weights: Vec<f64> = raw_weights.iter().map(|w| w / total).collect();

    let bandwidth = config
        .mode_bandwidth
        .or_else(|| silverman_bandwidth(&values, config.mode_phi));

    let mut result = match bandwidth {
        Some(h) => {
            debug!("{method}: bandwidth {h:.6}");
            let beta = kde_mode(&values, &weights, h);
            let draws = map_replicates(rng, config.n_bootstrap, config, "mode bootstrap", |r| {
                let resampled: Vec<f64> = values
                    .iter()
                    .zip(&ses)
                    .map(|(&v, &s)| {
                        let z: f64 = r.sample(StandardNormal);
                        v + s * z
                    })
                    .collect();
                kde_mode(&resampled, &weights, h)
            })?;
            EstimateResult::new(method, beta, sample_sd(&draws), ratios.len())
        }
        None => {
            // Every ratio is identical, so the density collapses onto it.
            debug!("{method}: ratios have no spread");
            let draws = map_replicates(rng, config.n_bootstrap, config, "mode bootstrap", |r| {
                values
                    .iter()
                    .zip(&ses)
                    .zip(&weights)
                    .map(|((&v, &s), &w)| {
                        let z: f64 = r.sample(StandardNormal);
                        w * (v + s * z)
                    })
                    .sum::<f64>()
            })?;
            let se = sample_sd(&draws);
            EstimateResult::new(method, values[0], se, ratios.len())
        }
    };

    if ratios.n_excluded > 0 {
        result = result.with_warning(EstimateWarning::ZeroExposureEffect {
            count: ratios.n_excluded,
        });
    }
    if !zero_se.is_empty() {
        result = result.with_warning(EstimateWarning::ZeroStandardError { ids: zero_se });
    }
    Ok(result)
}

pub fn simple_mode(
    table: &HarmonizedTable,
    config: &MrConfig,
    rng: &mut StdRng,
) -> Result<EstimateResult> {
    mode_estimate(Method::SimpleMode, table, config, rng)
}

pub fn weighted_mode(
    table: &HarmonizedTable,
    config: &MrConfig,
    rng: &mut StdRng,
) -> Result<EstimateResult> {
    mode_estimate(Method::WeightedMode, table, config, rng)
}
