#![allow(dead_code)]

use mrkit::{HarmonizedTable, HarmonizedVariant, SummaryRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

pub const TRUE_BETA: f64 = 0.5;
pub const SE: f64 = 0.02;

pub fn variant(id: &str, beta_exp: f64, se_exp: f64, beta_out: f64, se_out: f64) -> HarmonizedVariant {
    HarmonizedVariant {
        id: id.to_string(),
        effect_allele: "A".to_string(),
        other_allele: "G".to_string(),
        beta_exp,
        se_exp,
        beta_out,
        se_out,
        eaf_exp: None,
        eaf_out: None,
    }
}

/// `n` variants with `beta_exp ~ U(0.05, 0.2)` and outcome effects
/// `beta * beta_exp + noise`, plus `pleiotropy` added to the listed rows.
pub fn simulate(seed: u64, n: usize, beta: f64, pleiotropic: &[usize], pleiotropy: f64) -> HarmonizedTable {
    mrkit::logging::init_tracing();
    let mut rng = StdRng::seed_from_u64(seed);
    let variants = (0..n)
        .map(|i| {
            let beta_exp: f64 = rng.random_range(0.05..0.2);
            let noise: f64 = rng.sample(StandardNormal);
            let mut beta_out = beta * beta_exp + SE * noise;
            if pleiotropic.contains(&i) {
                beta_out += pleiotropy;
            }
            variant(&format!("rs{}", i + 1), beta_exp, SE, beta_out, SE)
        })
        .collect();
    HarmonizedTable::new(variants).expect("valid simulated table")
}

pub fn clean_scenario(seed: u64) -> HarmonizedTable {
    simulate(seed, 20, TRUE_BETA, &[], 0.0)
}

pub const PLEIOTROPIC: [usize; 4] = [2, 7, 11, 16];

pub fn contaminated_scenario(seed: u64) -> HarmonizedTable {
    simulate(seed, 20, TRUE_BETA, &PLEIOTROPIC, 0.3)
}

pub fn pleiotropic_ids() -> Vec<String> {
    PLEIOTROPIC.iter().map(|i| format!("rs{}", i + 1)).collect()
}

/// Exposure and outcome summary tables for the same simulated variants.
pub fn summary_tables(table: &HarmonizedTable) -> (Vec<SummaryRecord>, Vec<SummaryRecord>) {
    let exposure = table
        .variants()
        .iter()
        .map(|v| SummaryRecord::new(&v.id, "A", "G", v.beta_exp, v.se_exp))
        .collect();
    let outcome = table
        .variants()
        .iter()
        .map(|v| SummaryRecord::new(&v.id, "A", "G", v.beta_out, v.se_out))
        .collect();
    (exposure, outcome)
}
