use std::fmt;
use std::str::FromStr;

use crate::error::MrError;
use crate::stats::normal_pvalue;

/// One row of an exposure or outcome summary-statistics table.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub id: String,
    pub effect_allele: String,
    pub other_allele: String,
    pub beta: f64,
    pub se: f64,
    pub eaf: Option<f64>,
}

impl SummaryRecord {
    pub fn new(
        id: impl Into<String>,
        effect_allele: impl Into<String>,
        other_allele: impl Into<String>,
        beta: f64,
        se: f64,
    ) -> Self {
        Self {
            id: id.into(),
            effect_allele: effect_allele.into(),
            other_allele: other_allele.into(),
            beta,
            se,
            eaf: None,
        }
    }

    pub fn with_eaf(mut self, eaf: f64) -> Self {
        self.eaf = Some(eaf);
        self
    }
}

/// Exposure and outcome statistics expressed relative to the same effect allele.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizedVariant {
    pub id: String,
    pub effect_allele: String,
    pub other_allele: String,
    pub beta_exp: f64,
    pub se_exp: f64,
    pub beta_out: f64,
    pub se_out: f64,
    pub eaf_exp: Option<f64>,
    pub eaf_out: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HarmonizedTable {
    variants: Vec<HarmonizedVariant>,
}

impl HarmonizedTable {
    pub(crate) fn from_variants(variants: Vec<HarmonizedVariant>) -> Self {
        Self { variants }
    }

    /// Builds a table from already-aligned statistics, checking the table invariants.
    pub fn new(variants: Vec<HarmonizedVariant>) -> crate::error::Result<Self> {
        for v in &variants {
            let finite = v.beta_exp.is_finite()
                && v.se_exp.is_finite()
                && v.beta_out.is_finite()
                && v.se_out.is_finite();
            if !finite || v.se_exp <= 0.0 || v.se_out < 0.0 {
                return Err(MrError::InvalidArgument(format!(
                    "variant {} has invalid statistics (se_exp must be > 0, se_out >= 0, all finite)",
                    v.id
                )));
            }
        }
        Ok(Self { variants })
    }

    pub fn variants(&self) -> &[HarmonizedVariant] {
        &self.variants
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.id.clone()).collect()
    }

    /// Table restricted to `indices`, kept in the given order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        let variants = indices
            .iter()
            .filter_map(|&i| self.variants.get(i).cloned())
            .collect();
        Self { variants }
    }

    pub fn without(&self, index: usize) -> Self {
        let variants = self
            .variants
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, v)| v.clone())
            .collect();
        Self { variants }
    }

    pub fn beta_exp(&self) -> Vec<f64> {
        self.variants.iter().map(|v| v.beta_exp).collect()
    }

    pub fn se_exp(&self) -> Vec<f64> {
        self.variants.iter().map(|v| v.se_exp).collect()
    }

    pub fn beta_out(&self) -> Vec<f64> {
        self.variants.iter().map(|v| v.beta_out).collect()
    }

    pub fn se_out(&self) -> Vec<f64> {
        self.variants.iter().map(|v| v.se_out).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EstimateWarning {
    /// Variants whose ratio SE is zero dominate the inverse-variance weighting.
    ZeroStandardError { ids: Vec<String> },
    /// Variants with `beta_exp == 0` have no Wald ratio and were skipped.
    ZeroExposureEffect { count: usize },
    /// The confidence region reaches the edge of the search grid.
    GridTruncated,
    /// Outlier removal stopped before convergence.
    OutlierSearchIncomplete { reason: String },
}

impl fmt::Display for EstimateWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimateWarning::ZeroStandardError { ids } => write!(
                f,
                "zero ratio standard error for {}; estimate reduces to those variants",
                ids.join(",")
            ),
            EstimateWarning::ZeroExposureEffect { count } => {
                write!(f, "{count} variant(s) with zero exposure effect skipped")
            }
            EstimateWarning::GridTruncated => {
                write!(f, "confidence region truncated at the grid boundary")
            }
            EstimateWarning::OutlierSearchIncomplete { reason } => {
                write!(f, "outlier search incomplete: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimateResult {
    pub method: Method,
    pub beta: f64,
    pub se: f64,
    pub pval: f64,
    pub or: f64,
    pub or_lci: f64,
    pub or_uci: f64,
    pub nsnp: usize,
    pub warnings: Vec<EstimateWarning>,
}

impl EstimateResult {
    pub fn new(method: Method, beta: f64, se: f64, nsnp: usize) -> Self {
        Self {
            method,
            beta,
            se,
            pval: normal_pvalue(beta, se),
            or: beta.exp(),
            or_lci: (beta - 1.96 * se).exp(),
            or_uci: (beta + 1.96 * se).exp(),
            nsnp,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: EstimateWarning) -> Self {
        self.warnings.push(warning);
        self
    }

    pub fn z(&self) -> f64 {
        self.beta / self.se
    }
}

/// Closed set of estimators reachable through the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Ivw,
    WaldRatio,
    WeightedMedian,
    PenalizedWeightedMedian,
    SimpleMode,
    WeightedMode,
    Egger,
    Presso,
    ContaminationMixture,
    Bayesian,
}

impl Method {
    pub const ALL: [Method; 9] = [
        Method::Ivw,
        Method::WeightedMedian,
        Method::PenalizedWeightedMedian,
        Method::SimpleMode,
        Method::WeightedMode,
        Method::Egger,
        Method::Presso,
        Method::ContaminationMixture,
        Method::Bayesian,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::Ivw => "ivw",
            Method::WaldRatio => "wald_ratio",
            Method::WeightedMedian => "weighted_median",
            Method::PenalizedWeightedMedian => "penalized_weighted_median",
            Method::SimpleMode => "simple_mode",
            Method::WeightedMode => "weighted_mode",
            Method::Egger => "egger",
            Method::Presso => "presso",
            Method::ContaminationMixture => "contamination_mixture",
            Method::Bayesian => "bayesian",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = MrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let method = match key.as_str() {
            "ivw" => Method::Ivw,
            "wald_ratio" | "wald" => Method::WaldRatio,
            "weighted_median" | "median" => Method::WeightedMedian,
            "penalized_weighted_median" => Method::PenalizedWeightedMedian,
            "simple_mode" => Method::SimpleMode,
            "weighted_mode" | "mode" => Method::WeightedMode,
            "egger" | "mr_egger" => Method::Egger,
            "presso" | "mr_presso" => Method::Presso,
            "contamination_mixture" | "conmix" => Method::ContaminationMixture,
            "bayesian" | "bayes" => Method::Bayesian,
            _ => {
                return Err(MrError::InvalidArgument(format!("unknown method: {s}")));
            }
        };
        Ok(method)
    }
}
