use crate::types::{HarmonizedTable, HarmonizedVariant};

/// Per-variant Wald ratio `beta_out / beta_exp` and its delta-method SE.
#[derive(Debug, Clone, PartialEq)]
pub struct WaldRatio {
    /// Row of the variant in the source table.
    pub index: usize,
    pub id: String,
    pub ratio: f64,
    pub se: f64,
}

impl WaldRatio {
    pub fn weight(&self) -> f64 {
        1.0 / (self.se * self.se)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatioTable {
    pub ratios: Vec<WaldRatio>,
    /// Variants skipped because `beta_exp == 0`.
    pub n_excluded: usize,
}

impl RatioTable {
    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.ratios.iter().map(|r| r.ratio).collect()
    }

    pub fn ses(&self) -> Vec<f64> {
        self.ratios.iter().map(|r| r.se).collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.ratios.iter().map(WaldRatio::weight).collect()
    }
}

pub fn wald_ratio(v: &HarmonizedVariant, second_order: bool) -> Option<(f64, f64)> {
    if v.beta_exp == 0.0 {
        return None;
    }
    let ratio = v.beta_out / v.beta_exp;
    let first = v.se_out / v.beta_exp.abs();
    let se = if second_order {
        let b2 = v.beta_exp * v.beta_exp;
        (first * first + v.beta_out * v.beta_out * v.se_exp * v.se_exp / (b2 * b2)).sqrt()
    } else {
        first
    };
    Some((ratio, se))
}

pub fn wald_ratios(table: &HarmonizedTable, second_order: bool) -> RatioTable {
    let mut ratios = Vec::with_capacity(table.len());
    let mut n_excluded = 0;
    for (index, v) in table.variants().iter().enumerate() {
        match wald_ratio(v, second_order) {
            Some((ratio, se)) => ratios.push(WaldRatio {
                index,
                id: v.id.clone(),
                ratio,
                se,
            }),
            None => n_excluded += 1,
        }
    }
    RatioTable { ratios, n_excluded }
}

/// Inverse-variance weights. When any ratio SE is zero those variants carry
/// all of the weight equally; their ids are returned alongside.
pub fn inverse_variance_weights(ratios: &[WaldRatio]) -> (Vec<f64>, Vec<String>) {
    let zero: Vec<String> = ratios
        .iter()
        .filter(|r| r.se == 0.0)
        .map(|r| r.id.clone())
        .collect();
    if zero.is_empty() {
        (ratios.iter().map(WaldRatio::weight).collect(), zero)
    } else {
        let weights = ratios
            .iter()
            .map(|r| if r.se == 0.0 { 1.0 } else { 0.0 })
            .collect();
        (weights, zero)
    }
}
