mod common;

use common::{TRUE_BETA, variant};
use mrkit::bayes::bayesian_mr;
use mrkit::config::Prior;
use mrkit::mixture::contamination_mixture;
use mrkit::presso::{PressoTermination, mr_presso};
use mrkit::{HarmonizedTable, Method, MrConfig, MrError};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

#[test]
fn presso_flags_only_injected_pleiotropic_variants() {
    let injected = common::pleiotropic_ids();
    for seed in [21, 24, 25, 26, 27] {
        let table = common::contaminated_scenario(seed);
        let fit = mr_presso(&table, &MrConfig::default(), &mut rng(seed)).expect("presso");
        assert!(fit.global_test.pval < 0.05, "seed {seed}");
        assert!(!fit.outliers.is_empty(), "seed {seed}");
        assert!(
            fit.outliers.iter().all(|id| injected.contains(id)),
            "seed {seed}: outliers {:?}",
            fit.outliers
        );
        let removed: Vec<&String> = fit.rounds.iter().filter_map(|r| r.removed.as_ref()).collect();
        assert_eq!(removed.len(), fit.outliers.len());

        let corrected = fit.corrected.as_ref().expect("corrected estimate");
        assert_eq!(corrected.method, Method::Presso);
        assert_eq!(corrected.nsnp, table.len() - fit.outliers.len());
        assert!((corrected.beta - TRUE_BETA).abs() < (fit.raw.beta - TRUE_BETA).abs());
        assert_eq!(fit.best(), corrected);
    }
}

#[test]
fn presso_keeps_a_clean_table() {
    let table = common::clean_scenario(22);
    let fit = mr_presso(&table, &MrConfig::default(), &mut rng(2)).expect("presso");
    assert!(fit.outliers.len() <= 1);
    assert!(!fit.rounds.is_empty());
    assert_eq!(fit.rounds[0].nsnp, 20);
}

#[test]
fn presso_is_reproducible_across_thread_counts() {
    let table = common::contaminated_scenario(23);
    let serial = MrConfig {
        n_simulations: 300,
        ..Default::default()
    };
    let parallel = MrConfig {
        parallel: true,
        cores: Some(3),
        ..serial.clone()
    };
    let a = mr_presso(&table, &serial, &mut rng(4)).expect("presso");
    let b = mr_presso(&table, &parallel, &mut rng(4)).expect("presso");
    assert_eq!(a, b);
}

#[test]
fn presso_stops_at_the_iteration_limit() {
    let table = common::contaminated_scenario(21);
    let config = MrConfig {
        presso_max_iterations: 1,
        ..Default::default()
    };
    let fit = mr_presso(&table, &config, &mut rng(1)).expect("presso");
    assert_eq!(fit.rounds.len(), 1);
    assert_eq!(fit.outliers.len(), 1);
    assert!(fit.rounds[0].flagged.len() >= fit.outliers.len());
    assert_eq!(fit.rounds[0].removed.as_ref(), Some(&fit.outliers[0]));
    assert_eq!(fit.termination, PressoTermination::MaxIterations);
    assert!(!fit.best().warnings.is_empty());
}

#[test]
fn presso_rejects_small_tables() {
    let table = common::clean_scenario(1).subset(&[0, 1]);
    let err = mr_presso(&table, &MrConfig::default(), &mut rng(1)).expect_err("two variants");
    assert!(matches!(err, MrError::InsufficientInstruments { .. }));
}

#[test]
fn mixture_recovers_effect() {
    let table = common::contaminated_scenario(31);
    let fit = contamination_mixture(&table, &MrConfig::default()).expect("mixture");
    assert!((fit.estimate.beta - TRUE_BETA).abs() < 0.15, "beta = {}", fit.estimate.beta);
    assert!(!fit.intervals.is_empty());
    assert_eq!(fit.profile.len(), 2001);
    assert_eq!(fit.valid_probability.len(), 20);
    assert!(fit.valid_proportion > 0.0 && fit.valid_proportion < 1.0);

    let injected = common::pleiotropic_ids();
    let mean_valid = |outliers: bool| {
        let probs: Vec<f64> = fit
            .valid_probability
            .iter()
            .filter(|(id, _)| injected.contains(id) == outliers)
            .map(|(_, p)| *p)
            .collect();
        probs.iter().sum::<f64>() / probs.len() as f64
    };
    assert!(mean_valid(true) < mean_valid(false));
}

#[test]
fn mixture_interval_coverage() {
    let config = MrConfig {
        grid_resolution: 401,
        ..Default::default()
    };
    let trials = 200;
    let covered = (0..trials)
        .filter(|&seed| {
            let table = common::clean_scenario(1000 + seed);
            let fit = contamination_mixture(&table, &config).expect("mixture");
            fit.intervals
                .iter()
                .any(|&(lo, hi)| lo <= TRUE_BETA && TRUE_BETA <= hi)
        })
        .count();
    assert!(covered as f64 / trials as f64 >= 0.92, "covered {covered} of {trials}");
}

#[test]
fn mixture_reports_disjoint_region() {
    let mut variants = Vec::new();
    for i in 0..5 {
        variants.push(variant(&format!("up{i}"), 0.1, 0.01, 0.1, 0.001));
        variants.push(variant(&format!("down{i}"), 0.1, 0.01, -0.1, 0.001));
    }
    let table = HarmonizedTable::new(variants).expect("table");
    let fit = contamination_mixture(&table, &MrConfig::default()).expect("mixture");
    assert_eq!(fit.intervals.len(), 2, "intervals = {:?}", fit.intervals);
    let (lo, hi) = (fit.intervals[0], fit.intervals[1]);
    assert!(lo.1 < 0.0 && hi.0 > 0.0);
    assert!(lo.0 <= -1.0 && -1.0 <= lo.1);
    assert!(hi.0 <= 1.0 && 1.0 <= hi.1);
}

#[test]
fn mixture_without_spread_has_no_region() {
    let table = HarmonizedTable::new(vec![
        variant("rs1", 0.1, 0.01, 0.05, 0.0),
        variant("rs2", 0.2, 0.01, 0.1, 0.0),
        variant("rs3", 0.4, 0.01, 0.2, 0.0),
    ])
    .expect("table");
    let err = contamination_mixture(&table, &MrConfig::default()).expect_err("degenerate");
    assert!(matches!(err, MrError::EmptyConfidenceRegion(_)));
}

fn quick_bayes() -> MrConfig {
    MrConfig {
        n_samples: 2000,
        burn_in: 500,
        ..Default::default()
    }
}

#[test]
fn bayesian_posterior_centres_on_effect() {
    let table = common::clean_scenario(41);
    let fit = bayesian_mr(&table, &MrConfig::default(), &mut rng(1)).expect("bayes");
    assert!((fit.mean - TRUE_BETA).abs() < 0.1, "mean = {}", fit.mean);
    assert_eq!(fit.sample.draws.len(), 5000);
    assert!(fit.sample.tau_draws.is_none());
    assert!(fit.sample.acceptance_rate > 0.1 && fit.sample.acceptance_rate < 0.8);
    let (lo, hi) = fit.credible_interval;
    assert!(lo < fit.median && fit.median < hi);
    assert_eq!(fit.estimate.beta, fit.mean);
}

#[test]
fn bayesian_credible_interval_coverage() {
    let config = quick_bayes();
    let trials = 200;
    let covered = (0..trials)
        .filter(|&seed| {
            let table = common::clean_scenario(2000 + seed);
            let fit = bayesian_mr(&table, &config, &mut rng(seed)).expect("bayes");
            let (lo, hi) = fit.credible_interval;
            lo <= TRUE_BETA && TRUE_BETA <= hi
        })
        .count();
    assert!(covered as f64 / trials as f64 >= 0.92, "covered {covered} of {trials}");
}

#[test]
fn bayesian_sampler_is_deterministic() {
    let table = common::clean_scenario(42);
    let config = quick_bayes();
    let a = bayesian_mr(&table, &config, &mut rng(7)).expect("bayes");
    let b = bayesian_mr(&table, &config, &mut rng(7)).expect("bayes");
    assert_eq!(a, b);
}

#[test]
fn bayesian_pleiotropy_and_priors() {
    let table = common::contaminated_scenario(43);
    let config = MrConfig {
        estimate_pleiotropy: true,
        thin: 2,
        ..quick_bayes()
    };
    let fit = bayesian_mr(&table, &config, &mut rng(3)).expect("bayes");
    let tau = fit.sample.tau_draws.as_ref().expect("tau draws");
    assert_eq!(tau.len(), 2000);
    assert!(tau.iter().all(|t| *t > 0.0));

    let config = MrConfig {
        prior: Prior::Uniform {
            lower: 2.0,
            upper: 3.0,
        },
        ..quick_bayes()
    };
    let fit = bayesian_mr(&common::clean_scenario(44), &config, &mut rng(3)).expect("bayes");
    assert!(fit.sample.draws.iter().all(|b| (2.0..=3.0).contains(b)));
}

#[test]
fn bayesian_needs_outcome_standard_errors() {
    let table = HarmonizedTable::new(vec![
        variant("rs1", 0.1, 0.01, 0.05, 0.0),
        variant("rs2", 0.2, 0.01, 0.1, 0.02),
    ])
    .expect("table");
    let err = bayesian_mr(&table, &MrConfig::default(), &mut rng(1)).expect_err("zero se");
    assert!(matches!(err, MrError::InvalidArgument(_)));
}
