//! Inverse-variance weighted combination of Wald ratios.

use tracing::warn;

use crate::config::MrConfig;
use crate::error::Result;
use crate::qc::check_instruments;
use crate::ratio::{WaldRatio, wald_ratios};
use crate::types::{EstimateResult, EstimateWarning, HarmonizedTable, Method};

pub const MIN_INSTRUMENTS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct IvwFit {
    pub beta: f64,
    pub se: f64,
    /// Cochran's Q around `beta` using the same weights.
    pub q: f64,
    pub df: usize,
    /// Ids of variants whose ratio SE is zero; non-empty means a degenerate fit.
    pub zero_se: Vec<String>,
}

pub fn ivw_fit(ratios: &[WaldRatio], random_effects: bool) -> IvwFit {
    let zero_se: Vec<&WaldRatio> = ratios.iter().filter(|r| r.se == 0.0).collect();
    let df = ratios.len().saturating_sub(1);

    if !zero_se.is_empty() {
        let beta = zero_se.iter().map(|r| r.ratio).sum::<f64>() / zero_se.len() as f64;
        return IvwFit {
            beta,
            se: 0.0,
            q: f64::NAN,
            df,
            zero_se: zero_se.iter().map(|r| r.id.clone()).collect(),
        };
    }

    let (sw, swr) = ratios.iter().fold((0.0, 0.0), |(sw, swr), r| {
        let w = r.weight();
        (sw + w, swr + w * r.ratio)
    });
    let beta = swr / sw;
    let q: f64 = ratios
        .iter()
        .map(|r| r.weight() * (r.ratio - beta).powi(2))
        .sum();

    let mut se = (1.0 / sw).sqrt();
    if random_effects && df > 0 {
        se *= (q / df as f64).max(1.0).sqrt();
    }

    IvwFit {
        beta,
        se,
        q,
        df,
        zero_se: Vec::new(),
    }
}

pub fn ivw(table: &HarmonizedTable, config: &MrConfig) -> Result<EstimateResult> {
    config.validate()?;
    let ratios = wald_ratios(table, config.second_order_weights);
    check_instruments("ivw", ratios.len(), MIN_INSTRUMENTS, config.min_instruments)?;

    let fit = ivw_fit(&ratios.ratios, config.random_effects);
    let mut result = EstimateResult::new(Method::Ivw, fit.beta, fit.se, ratios.len());
    if ratios.n_excluded > 0 {
        result = result.with_warning(EstimateWarning::ZeroExposureEffect {
            count: ratios.n_excluded,
        });
    }
    if !fit.zero_se.is_empty() {
        warn!(
            "IVW: {} variant(s) with zero ratio standard error dominate the estimate",
            fit.zero_se.len()
        );
        result = result.with_warning(EstimateWarning::ZeroStandardError { ids: fit.zero_se });
    }
    Ok(result)
}
