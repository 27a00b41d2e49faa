//! Weighted median estimators with parametric-bootstrap standard errors.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

use crate::config::MrConfig;
use crate::error::Result;
use crate::ivw::ivw_fit;
use crate::parallel::map_replicates;
use crate::qc::check_instruments;
use crate::ratio::{RatioTable, inverse_variance_weights, wald_ratios};
use crate::stats::{pchisq_upper, sample_sd};
use crate::types::{EstimateResult, EstimateWarning, HarmonizedTable, Method};

pub const MIN_INSTRUMENTS: usize = 3;

/// Penalty multiplier applied to the heterogeneity p-value of each variant.
const PENALTY_SCALE: f64 = 20.0;

fn order_by_value(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    order
}

/// Value at the first normalized cumulative weight reaching one half.
pub fn weighted_median_step(values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    let order = order_by_value(values);
    let mut cum = 0.0;
    for &i in &order {
        cum += weights[i] / total;
        if cum >= 0.5 {
            return values[i];
        }
    }
    order.last().map_or(f64::NAN, |&i| values[i])
}

/// Interpolated weighted median: each variant's mass is centred on its value.
pub fn weighted_median_interpolated(values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    let order = order_by_value(values);
    let sorted_values: Vec<f64> = order.iter().map(|&i| values[i]).collect();
    let mut positions = Vec::with_capacity(order.len());
    let mut cum = 0.0;
    for &i in &order {
        let w = weights[i] / total;
        positions.push(cum + 0.5 * w);
        cum += w;
    }

    let below = positions.iter().rposition(|&p| p < 0.5);
    match below {
        None => sorted_values.first().copied().unwrap_or(f64::NAN),
        Some(b) if b + 1 >= sorted_values.len() => sorted_values[b],
        Some(b) => {
            let span = positions[b + 1] - positions[b];
            if span <= 0.0 {
                return sorted_values[b];
            }
            sorted_values[b]
                + (sorted_values[b + 1] - sorted_values[b]) * (0.5 - positions[b]) / span
        }
    }
}

fn penalized_weights(ratios: &RatioTable, weights: &[f64]) -> Vec<f64> {
    let center = ivw_fit(&ratios.ratios, false).beta;
    ratios
        .ratios
        .iter()
        .zip(weights)
        .map(|(r, &w)| {
            if r.se == 0.0 {
                return w;
            }
            let q = r.weight() * (r.ratio - center).powi(2);
            w * (PENALTY_SCALE * pchisq_upper(q, 1.0)).min(1.0)
        })
        .collect()
}

fn median_estimate(
    method: Method,
    table: &HarmonizedTable,
    config: &MrConfig,
    rng: &mut StdRng,
) -> Result<EstimateResult> {
    config.validate()?;
    let ratios = wald_ratios(table, config.second_order_weights);
    check_instruments(method.name(), ratios.len(), MIN_INSTRUMENTS, config.min_instruments)?;

    let (mut weights, zero_se) = inverse_variance_weights(&ratios.ratios);
    let penalized = method == Method::PenalizedWeightedMedian;
    if penalized {
        weights = penalized_weights(&ratios, &weights);
        if weights.iter().sum::<f64>() <= 0.0 {
            weights = inverse_variance_weights(&ratios.ratios).0;
        }
    }
    let median = |values: &[f64]| {
        if penalized {
            weighted_median_interpolated(values, &weights)
        } else {
            weighted_median_step(values, &weights)
        }
    };

    let values = ratios.values();
    let ses = ratios.ses();
    let beta = median(&values);

    let draws = map_replicates(rng, config.n_bootstrap, config, "weighted median bootstrap", |r| {
        let resampled: Vec<f64> = values
            .iter()
            .zip(&ses)
            .map(|(&v, &s)| {
                let z: f64 = r.sample(StandardNormal);
                v + s * z
            })
            .collect();
        median(&resampled)
    })?;
    let se = sample_sd(&draws);

    let mut result = EstimateResult::new(method, beta, se, ratios.len());
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

pub fn weighted_median(
    table: &HarmonizedTable,
    config: &MrConfig,
    rng: &mut StdRng,
) -> Result<EstimateResult> {
    median_estimate(Method::WeightedMedian, table, config, rng)
}

pub fn penalized_weighted_median(
    table: &HarmonizedTable,
    config: &MrConfig,
    rng: &mut StdRng,
) -> Result<EstimateResult> {
    median_estimate(Method::PenalizedWeightedMedian, table, config, rng)
}
