use crate::error::{MrError, Result};
use crate::qc::{check_nonzero_count, check_positive, check_range_f64};

/// Prior on the causal effect used by the Bayesian sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prior {
    Normal { mean: f64, sd: f64 },
    Uniform { lower: f64, upper: f64 },
    Flat,
}

impl Prior {
    /// Log density up to an additive constant. `NEG_INFINITY` outside the support.
    pub fn log_density(&self, beta: f64) -> f64 {
        match *self {
            Prior::Normal { mean, sd } => {
                let z = (beta - mean) / sd;
                -0.5 * z * z
            }
            Prior::Uniform { lower, upper } => {
                if beta >= lower && beta <= upper {
                    0.0
                } else {
                    f64::NEG_INFINITY
                }
            }
            Prior::Flat => 0.0,
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Prior::Normal { mean, sd } => {
                if !mean.is_finite() {
                    return Err(MrError::InvalidArgument(
                        "Normal prior mean should be finite".to_string(),
                    ));
                }
                check_positive(sd, "prior sd")
            }
            Prior::Uniform { lower, upper } => {
                if !lower.is_finite() || !upper.is_finite() || lower >= upper {
                    return Err(MrError::InvalidArgument(format!(
                        "Uniform prior bounds should be finite with lower < upper, got [{lower}, {upper}]"
                    )));
                }
                Ok(())
            }
            Prior::Flat => Ok(()),
        }
    }
}

impl Default for Prior {
    fn default() -> Self {
        Prior::Normal {
            mean: 0.0,
            sd: 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MrConfig {
    pub min_instruments: Option<usize>,
    pub significance_level: f64,
    pub palindrome_threshold: f64,
    pub second_order_weights: bool,
    pub random_effects: bool,
    pub n_bootstrap: usize,
    pub mode_bandwidth: Option<f64>,
    pub mode_phi: f64,
    pub n_simulations: usize,
    pub presso_max_iterations: usize,
    pub grid_resolution: usize,
    pub grid_width: f64,
    pub valid_proportion: f64,
    pub invalid_sd_multiplier: f64,
    pub prior: Prior,
    pub n_samples: usize,
    pub burn_in: usize,
    pub thin: usize,
    pub estimate_pleiotropy: bool,
    pub pleiotropy_prior_sd: f64,
    pub seed: u64,
    pub parallel: bool,
    pub cores: Option<usize>,
}

impl Default for MrConfig {
    fn default() -> Self {
        Self {
            min_instruments: None,
            significance_level: 0.05,
            palindrome_threshold: 0.08,
            second_order_weights: false,
            random_effects: false,
            n_bootstrap: 1000,
            mode_bandwidth: None,
            mode_phi: 1.0,
            n_simulations: 1000,
            presso_max_iterations: 10,
            grid_resolution: 2001,
            grid_width: 10.0,
            valid_proportion: 0.5,
            invalid_sd_multiplier: 1.5,
            prior: Prior::default(),
            n_samples: 5000,
            burn_in: 1000,
            thin: 1,
            estimate_pleiotropy: false,
            pleiotropy_prior_sd: 1.0,
            seed: 42,
            parallel: false,
            cores: None,
        }
    }
}

impl MrConfig {
    pub fn validate(&self) -> Result<()> {
        check_range_f64(self.significance_level, 0.0, 1.0, false, "significance_level")?;
        check_range_f64(self.palindrome_threshold, 0.0, 0.5, true, "palindrome_threshold")?;
        check_nonzero_count(self.n_bootstrap, "n_bootstrap")?;
        if let Some(h) = self.mode_bandwidth {
            check_positive(h, "mode_bandwidth")?;
        }
        check_positive(self.mode_phi, "mode_phi")?;
        check_nonzero_count(self.n_simulations, "n_simulations")?;
        check_nonzero_count(self.presso_max_iterations, "presso_max_iterations")?;
        if self.grid_resolution < 3 {
            return Err(MrError::InvalidArgument(format!(
                "Value of grid_resolution should be at least 3, got {}",
                self.grid_resolution
            )));
        }
        check_positive(self.grid_width, "grid_width")?;
        check_range_f64(self.valid_proportion, 0.0, 1.0, false, "valid_proportion")?;
        check_positive(self.invalid_sd_multiplier, "invalid_sd_multiplier")?;
        self.prior.validate()?;
        check_nonzero_count(self.n_samples, "n_samples")?;
        check_nonzero_count(self.thin, "thin")?;
        check_positive(self.pleiotropy_prior_sd, "pleiotropy_prior_sd")?;
        if let Some(cores) = self.cores {
            check_nonzero_count(cores, "cores")?;
        }
        Ok(())
    }

    /// Two-sided normal critical value matching `significance_level`.
    pub fn z_critical(&self) -> f64 {
        crate::stats::normal_quantile(1.0 - self.significance_level / 2.0)
    }
}
