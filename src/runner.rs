//! Method dispatch and the multi-method analysis entry point.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::bayes::bayesian_mr;
use crate::config::MrConfig;
use crate::egger::mr_egger;
use crate::error::{MrError, Result};
use crate::harmonize::{HarmonizationReport, harmonize};
use crate::ivw::ivw;
use crate::median::{penalized_weighted_median, weighted_median};
use crate::mixture::contamination_mixture;
use crate::mode::{simple_mode, weighted_mode};
use crate::presso::mr_presso;
use crate::ratio::wald_ratio;
use crate::sensitivity::{Heterogeneity, heterogeneity};
use crate::types::{EstimateResult, HarmonizedTable, Method, SummaryRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct MethodOutcome {
    pub method: Method,
    pub result: Result<EstimateResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MrReport {
    pub table: HarmonizedTable,
    pub harmonization: HarmonizationReport,
    pub results: Vec<MethodOutcome>,
    pub heterogeneity: Result<Heterogeneity>,
}

fn method_salt(method: Method) -> u64 {
    method
        .name()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        })
}

/// Generator for `method`, independent of which other methods run alongside it.
pub fn method_rng(seed: u64, method: Method) -> StdRng {
    StdRng::seed_from_u64(seed ^ method_salt(method))
}

fn single_wald(table: &HarmonizedTable, config: &MrConfig) -> Result<EstimateResult> {
    let [variant] = table.variants() else {
        return Err(MrError::InvalidArgument(format!(
            "wald_ratio applies to exactly one variant, found {}",
            table.len()
        )));
    };
    let (ratio, se) = wald_ratio(variant, config.second_order_weights).ok_or(
        MrError::InsufficientInstruments {
            method: "wald_ratio",
            required: 1,
            found: 0,
        },
    )?;
    Ok(EstimateResult::new(Method::WaldRatio, ratio, se, 1))
}

pub fn run_method(
    method: Method,
    table: &HarmonizedTable,
    config: &MrConfig,
    rng: &mut StdRng,
) -> Result<EstimateResult> {
    match method {
        Method::Ivw => ivw(table, config),
        Method::WaldRatio => single_wald(table, config),
        Method::WeightedMedian => weighted_median(table, config, rng),
        Method::PenalizedWeightedMedian => penalized_weighted_median(table, config, rng),
        Method::SimpleMode => simple_mode(table, config, rng),
        Method::WeightedMode => weighted_mode(table, config, rng),
        Method::Egger => mr_egger(table, config).map(|fit| fit.estimate),
        Method::Presso => mr_presso(table, config, rng).map(|fit| fit.best().clone()),
        Method::ContaminationMixture => contamination_mixture(table, config).map(|fit| fit.estimate),
        Method::Bayesian => bayesian_mr(table, config, rng).map(|fit| fit.estimate),
    }
}

/// Runs every method independently; one failure never aborts the others.
pub fn run_methods(
    table: &HarmonizedTable,
    methods: &[Method],
    config: &MrConfig,
) -> Vec<MethodOutcome> {
    methods
        .iter()
        .map(|&method| {
            let mut rng = method_rng(config.seed, method);
            let result = run_method(method, table, config, &mut rng);
            if let Err(err) = &result {
                warn!("{method} failed: {err}");
            }
            MethodOutcome { method, result }
        })
        .collect()
}

pub fn analyze(
    exposure: &[SummaryRecord],
    outcome: &[SummaryRecord],
    methods: &[Method],
    config: &MrConfig,
) -> Result<MrReport> {
    config.validate()?;
    let harmonized = harmonize(exposure, outcome, config)?;
    info!(
        "Running {} method(s) on {} harmonized variants",
        methods.len(),
        harmonized.table.len()
    );
    let results = run_methods(&harmonized.table, methods, config);
    let heterogeneity = heterogeneity(&harmonized.table, config);
    Ok(MrReport {
        table: harmonized.table,
        harmonization: harmonized.report,
        results,
        heterogeneity,
    })
}
