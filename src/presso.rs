//! Outlier-robust IVW in the style of MR-PRESSO.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use tracing::{debug, info};

use crate::config::MrConfig;
use crate::error::{MrError, Result};
use crate::ivw::ivw_fit;
use crate::parallel::map_replicates;
use crate::qc::check_instruments;
use crate::ratio::wald_ratios;
use crate::types::{EstimateResult, EstimateWarning, HarmonizedTable, Method};

pub const MIN_INSTRUMENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalTest {
    pub rss_obs: f64,
    pub pval: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PressoRound {
    pub nsnp: usize,
    pub global: GlobalTest,
    /// Ids flagged in this round with their Bonferroni-corrected p-values.
    pub flagged: Vec<(String, f64)>,
    /// The most extreme flagged variant, the only one removed this round.
    pub removed: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressoTermination {
    /// Global test not significant or no variant flagged.
    Converged,
    MaxIterations,
    /// Removing another variant would leave fewer than three.
    TooFewInstruments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressoState {
    Fitting,
    OutlierTest,
    RemoveAndRefit,
    Done(PressoTermination),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PressoFit {
    pub raw: EstimateResult,
    /// Estimate after outlier removal; `None` when nothing was removed.
    pub corrected: Option<EstimateResult>,
    pub outliers: Vec<String>,
    /// Global heterogeneity test on the full table.
    pub global_test: GlobalTest,
    pub rounds: Vec<PressoRound>,
    pub termination: PressoTermination,
}

impl PressoFit {
    /// Corrected estimate when outliers were removed, otherwise the raw one.
    pub fn best(&self) -> &EstimateResult {
        self.corrected.as_ref().unwrap_or(&self.raw)
    }
}

struct Simulation {
    rss_obs: f64,
    residuals_obs: Vec<f64>,
    rss_null: Vec<f64>,
    residuals_null: Vec<Vec<f64>>,
}

fn simulate(
    table: &HarmonizedTable,
    config: &MrConfig,
    rng: &mut StdRng,
) -> Result<Simulation> {
    let x = table.beta_exp();
    let y = table.beta_out();
    let sx = table.se_exp();
    let w: Vec<f64> = table.se_out().iter().map(|s| 1.0 / (s * s)).collect();
    let sy = table.se_out();

    let sxy: f64 = (0..x.len()).map(|i| w[i] * x[i] * y[i]).sum();
    let sxx: f64 = (0..x.len()).map(|i| w[i] * x[i] * x[i]).sum();

    let mut loo = Vec::with_capacity(x.len());
    for i in 0..x.len() {
        let denom = sxx - w[i] * x[i] * x[i];
        if denom <= 0.0 || !denom.is_finite() {
            return Err(MrError::SingularRegression(format!(
                "leave-one-out fit without {} has no exposure signal",
                table.variants()[i].id
            )));
        }
        loo.push((sxy - w[i] * x[i] * y[i]) / denom);
    }

    let residuals_obs: Vec<f64> = (0..x.len())
        .map(|i| w[i] * (y[i] - loo[i] * x[i]).powi(2))
        .collect();
    let rss_obs = residuals_obs.iter().sum();

    let residuals_null = map_replicates(rng, config.n_simulations, config, "presso simulation", |r| {
        (0..x.len())
            .map(|i| {
                let z_exp: f64 = r.sample(StandardNormal);
                let z_out: f64 = r.sample(StandardNormal);
                let x_sim = x[i] + sx[i] * z_exp;
                let y_sim = loo[i] * x[i] + sy[i] * z_out;
                w[i] * (y_sim - loo[i] * x_sim).powi(2)
            })
            .collect::<Vec<f64>>()
    })?;
    let rss_null = residuals_null.iter().map(|r| r.iter().sum()).collect();

    Ok(Simulation {
        rss_obs,
        residuals_obs,
        rss_null,
        residuals_null,
    })
}

fn robust_ivw(table: &HarmonizedTable, config: &MrConfig) -> EstimateResult {
    let ratios = wald_ratios(table, config.second_order_weights);
    let fit = ivw_fit(&ratios.ratios, true);
    EstimateResult::new(Method::Presso, fit.beta, fit.se, ratios.len())
}

pub fn mr_presso(
    table: &HarmonizedTable,
    config: &MrConfig,
    rng: &mut StdRng,
) -> Result<PressoFit> {
    config.validate()?;
    check_instruments("presso", table.len(), MIN_INSTRUMENTS, config.min_instruments)?;
    if let Some(v) = table.variants().iter().find(|v| v.se_out <= 0.0) {
        return Err(MrError::InvalidArgument(format!(
            "presso requires positive outcome standard errors; {} has {}",
            v.id, v.se_out
        )));
    }

    let mut raw = robust_ivw(table, config);
    let alpha = config.significance_level;
    let n_sim = config.n_simulations as f64;

    let mut current: Vec<usize> = (0..table.len()).collect();
    let mut outliers = Vec::new();
    let mut rounds: Vec<PressoRound> = Vec::new();
    let mut state = PressoState::Fitting;
    let mut sim: Option<Simulation> = None;
    let mut removal: Option<usize> = None;

    let termination = loop {
        state = match state {
            PressoState::Fitting => {
                let working = table.subset(&current);
                sim = Some(simulate(&working, config, rng)?);
                PressoState::OutlierTest
            }
            PressoState::OutlierTest => {
                let Some(s) = sim.as_ref() else {
                    break PressoTermination::Converged;
                };
                let exceed = s.rss_null.iter().filter(|&&r| r >= s.rss_obs).count();
                let global = GlobalTest {
                    rss_obs: s.rss_obs,
                    pval: exceed as f64 / n_sim,
                };
                let m = current.len() as f64;
                let mut flagged_ids = Vec::new();
                // (p, obs / mean null residual, position) of the worst variant so far
                let mut worst: Option<(f64, f64, usize)> = None;
                if global.pval < alpha {
                    for (k, &obs) in s.residuals_obs.iter().enumerate() {
                        let exceed = s.residuals_null.iter().filter(|r| r[k] >= obs).count();
                        let p = (exceed as f64 / n_sim * m).min(1.0);
                        if p >= alpha {
                            continue;
                        }
                        flagged_ids.push((table.variants()[current[k]].id.clone(), p));
                        let null_mean =
                            s.residuals_null.iter().map(|r| r[k]).sum::<f64>() / n_sim;
                        let score = obs / null_mean;
                        let more_extreme = match worst {
                            None => true,
                            Some((wp, ws, _)) => p < wp || (p == wp && score > ws),
                        };
                        if more_extreme {
                            worst = Some((p, score, k));
                        }
                    }
                }
                removal = worst.map(|(_, _, k)| current[k]);
                let next = if removal.is_none() {
                    PressoState::Done(PressoTermination::Converged)
                } else if current.len() - 1 < MIN_INSTRUMENTS {
                    removal = None;
                    PressoState::Done(PressoTermination::TooFewInstruments)
                } else {
                    PressoState::RemoveAndRefit
                };
                debug!(
                    "presso round {}: {} variants, global p = {}, {} flagged",
                    rounds.len() + 1,
                    current.len(),
                    global.pval,
                    flagged_ids.len()
                );
                rounds.push(PressoRound {
                    nsnp: current.len(),
                    global,
                    flagged: flagged_ids,
                    removed: removal.map(|i| table.variants()[i].id.clone()),
                });
                next
            }
            PressoState::RemoveAndRefit => {
                if let Some(i) = removal.take() {
                    current.retain(|&c| c != i);
                    outliers.push(table.variants()[i].id.clone());
                }
                if rounds.len() >= config.presso_max_iterations {
                    PressoState::Done(PressoTermination::MaxIterations)
                } else {
                    PressoState::Fitting
                }
            }
            PressoState::Done(t) => break t,
        };
    };

    let global_test = rounds
        .first()
        .map(|r| r.global)
        .unwrap_or(GlobalTest {
            rss_obs: f64::NAN,
            pval: f64::NAN,
        });

    let mut corrected = (!outliers.is_empty()).then(|| robust_ivw(&table.subset(&current), config));
    if termination != PressoTermination::Converged {
        let warning = EstimateWarning::OutlierSearchIncomplete {
            reason: format!("{termination:?}"),
        };
        match corrected.as_mut() {
            Some(est) => est.warnings.push(warning),
            None => raw.warnings.push(warning),
        }
    }

    info!(
        "presso: {} outlier(s) removed over {} round(s), termination {:?}",
        outliers.len(),
        rounds.len(),
        termination
    );

    Ok(PressoFit {
        raw,
        corrected,
        outliers,
        global_test,
        rounds,
        termination,
    })
}
