//! Metropolis-Hastings sampler for the causal effect.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use tracing::debug;

use crate::config::{MrConfig, Prior};
use crate::error::{MrError, Result};
use crate::ivw::ivw_fit;
use crate::qc::check_instruments;
use crate::ratio::wald_ratios;
use crate::stats::{mean, quantile_sorted, sample_sd, sorted};
use crate::types::{EstimateResult, HarmonizedTable, Method};

pub const MIN_INSTRUMENTS: usize = 2;

const ADAPT_WINDOW: usize = 50;
const TARGET_LOW: f64 = 0.2;
const TARGET_HIGH: f64 = 0.4;
const SHRINK: f64 = 0.7;
const GROW: f64 = 1.3;

#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorSample {
    pub draws: Vec<f64>,
    /// Pleiotropy standard deviation draws, when sampled.
    pub tau_draws: Option<Vec<f64>>,
    /// Acceptance rate of causal-effect proposals after burn-in.
    pub acceptance_rate: f64,
    pub burn_in_acceptance_rate: f64,
    pub step_size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BayesianFit {
    /// Posterior mean and standard deviation in the common result shape.
    pub estimate: EstimateResult,
    pub mean: f64,
    pub median: f64,
    pub sd: f64,
    pub credible_interval: (f64, f64),
    pub sample: PosteriorSample,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counter {
    accepted: usize,
    proposed: usize,
}

impl Counter {
    fn record(&mut self, accepted: bool) {
        self.proposed += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    fn rate(&self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            self.accepted as f64 / self.proposed as f64
        }
    }
}

struct MhSampler {
    x: Vec<f64>,
    y: Vec<f64>,
    var_y: Vec<f64>,
    prior: Prior,
    pleiotropy_sd: Option<f64>,
    beta: f64,
    log_tau: f64,
    log_post: f64,
    beta_step: f64,
    tau_step: f64,
}

impl MhSampler {
    fn log_posterior(&self, beta: f64, log_tau: f64) -> f64 {
        let lp_beta = self.prior.log_density(beta);
        if lp_beta == f64::NEG_INFINITY {
            return lp_beta;
        }
        let tau2 = match self.pleiotropy_sd {
            Some(_) => (2.0 * log_tau).exp(),
            None => 0.0,
        };
        let loglik: f64 = self
            .x
            .iter()
            .zip(&self.y)
            .zip(&self.var_y)
            .map(|((&x, &y), &v)| {
                let var = v + tau2;
                let r = y - beta * x;
                -0.5 * (r * r / var + var.ln())
            })
            .sum();
        let lp_tau = match self.pleiotropy_sd {
            // Half-normal prior on tau plus the Jacobian of the log transform.
            Some(sd) => {
                let tau = log_tau.exp();
                -0.5 * (tau / sd).powi(2) + log_tau
            }
            None => 0.0,
        };
        loglik + lp_beta + lp_tau
    }

    fn step(&mut self, rng: &mut StdRng, beta_acc: &mut Counter, tau_acc: &mut Counter) {
        let z: f64 = rng.sample(StandardNormal);
        let proposal = self.beta + self.beta_step * z;
        let lp = self.log_posterior(proposal, self.log_tau);
        let accept = rng.random::<f64>().ln() < lp - self.log_post;
        if accept {
            self.beta = proposal;
            self.log_post = lp;
        }
        beta_acc.record(accept);

        if self.pleiotropy_sd.is_some() {
            let z: f64 = rng.sample(StandardNormal);
            let proposal = self.log_tau + self.tau_step * z;
            let lp = self.log_posterior(self.beta, proposal);
            let accept = rng.random::<f64>().ln() < lp - self.log_post;
            if accept {
                self.log_tau = proposal;
                self.log_post = lp;
            }
            tau_acc.record(accept);
        }
    }
}

fn adapt(step: &mut f64, window: &Counter) {
    let rate = window.rate();
    if rate < TARGET_LOW {
        *step *= SHRINK;
    } else if rate > TARGET_HIGH {
        *step *= GROW;
    }
}

fn starting_beta(prior: &Prior, ivw_beta: f64) -> f64 {
    match *prior {
        Prior::Uniform { lower, upper } if !(lower..=upper).contains(&ivw_beta) => {
            0.5 * (lower + upper)
        }
        _ => ivw_beta,
    }
}

/// Convergence is not checked; inspect the acceptance rate or compare seeds.
pub fn bayesian_mr(
    table: &HarmonizedTable,
    config: &MrConfig,
    rng: &mut StdRng,
) -> Result<BayesianFit> {
    config.validate()?;
    check_instruments("bayesian", table.len(), MIN_INSTRUMENTS, config.min_instruments)?;
    if let Some(v) = table.variants().iter().find(|v| v.se_out <= 0.0) {
        return Err(MrError::InvalidArgument(format!(
            "bayesian sampler requires positive outcome standard errors; {} has {}",
            v.id, v.se_out
        )));
    }

    let ratios = wald_ratios(table, false);
    let start = ivw_fit(&ratios.ratios, false);
    let initial_step = if start.se.is_finite() && start.se > 0.0 {
        2.4 * start.se
    } else {
        0.1
    };
    let se_out = table.se_out();
    let mut sampler = MhSampler {
        x: table.beta_exp(),
        y: table.beta_out(),
        var_y: se_out.iter().map(|s| s * s).collect(),
        prior: config.prior,
        pleiotropy_sd: config.estimate_pleiotropy.then_some(config.pleiotropy_prior_sd),
        beta: starting_beta(&config.prior, start.beta),
        log_tau: mean(&se_out).ln(),
        log_post: 0.0,
        beta_step: initial_step,
        tau_step: 0.5,
    };
    sampler.log_post = sampler.log_posterior(sampler.beta, sampler.log_tau);
    if !sampler.log_post.is_finite() {
        return Err(MrError::InvalidArgument(format!(
            "posterior density is not finite at the starting value {}",
            sampler.beta
        )));
    }

    let mut burn_beta = Counter::default();
    let mut window_beta = Counter::default();
    let mut window_tau = Counter::default();
    for i in 0..config.burn_in {
        sampler.step(rng, &mut window_beta, &mut window_tau);
        if (i + 1) % ADAPT_WINDOW == 0 {
            adapt(&mut sampler.beta_step, &window_beta);
            adapt(&mut sampler.tau_step, &window_tau);
            debug!(
                "bayesian burn-in {}: acceptance {:.3}, step {:.5}",
                i + 1,
                window_beta.rate(),
                sampler.beta_step
            );
            burn_beta.accepted += window_beta.accepted;
            burn_beta.proposed += window_beta.proposed;
            window_beta = Counter::default();
            window_tau = Counter::default();
        }
    }
    burn_beta.accepted += window_beta.accepted;
    burn_beta.proposed += window_beta.proposed;

    let mut sample_beta = Counter::default();
    let mut sample_tau = Counter::default();
    let mut draws = Vec::with_capacity(config.n_samples);
    let mut tau_draws = config
        .estimate_pleiotropy
        .then(|| Vec::with_capacity(config.n_samples));
    for _ in 0..config.n_samples {
        for _ in 0..config.thin {
            sampler.step(rng, &mut sample_beta, &mut sample_tau);
        }
        draws.push(sampler.beta);
        if let Some(t) = tau_draws.as_mut() {
            t.push(sampler.log_tau.exp());
        }
    }

    let alpha = config.significance_level;
    let ordered = sorted(&draws);
    let post_mean = mean(&draws);
    let post_sd = sample_sd(&draws);
    let median = quantile_sorted(&ordered, 0.5);
    let credible_interval = (
        quantile_sorted(&ordered, alpha / 2.0),
        quantile_sorted(&ordered, 1.0 - alpha / 2.0),
    );

    debug!(
        "bayesian: acceptance {:.3} (burn-in {:.3})",
        sample_beta.rate(),
        burn_beta.rate()
    );

    Ok(BayesianFit {
        estimate: EstimateResult::new(Method::Bayesian, post_mean, post_sd, table.len()),
        mean: post_mean,
        median,
        sd: post_sd,
        credible_interval,
        sample: PosteriorSample {
            draws,
            tau_draws,
            acceptance_rate: sample_beta.rate(),
            burn_in_acceptance_rate: burn_beta.rate(),
            step_size: sampler.beta_step,
        },
    })
}
