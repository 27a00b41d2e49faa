mod common;

use std::str::FromStr;

use mrkit::runner::method_rng;
use mrkit::sensitivity::{leave_one_out, single_variant};
use mrkit::tables::{estimates_table, leave_one_out_table, single_variant_table};
use mrkit::{Method, MrConfig, MrError, analyze, run_method, run_methods};

#[test]
fn method_names_round_trip() {
    for method in Method::ALL.iter().chain([Method::WaldRatio].iter()) {
        let parsed = Method::from_str(method.name()).expect("known method");
        assert_eq!(parsed, *method);
    }
    assert_eq!(Method::from_str("MR-Egger").expect("alias"), Method::Egger);
    assert!(matches!(
        Method::from_str("lasso"),
        Err(MrError::InvalidArgument(_))
    ));
}

#[test]
fn one_failure_does_not_abort_the_rest() {
    let table = common::clean_scenario(71).subset(&[0, 1]);
    let methods = [Method::Ivw, Method::WeightedMedian, Method::Egger, Method::Bayesian];
    let outcomes = run_methods(&table, &methods, &MrConfig::default());
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(
        outcomes[1].result,
        Err(MrError::InsufficientInstruments { .. })
    ));
    assert!(outcomes[2].result.is_err());
    assert!(outcomes[3].result.is_ok());

    let frame = estimates_table(&outcomes).expect("table");
    assert_eq!(frame.height(), 4);
    assert_eq!(frame.column("beta").expect("beta").null_count(), 2);
    assert_eq!(frame.column("note").expect("note").null_count(), 2);
}

#[test]
fn wald_ratio_needs_exactly_one_variant() {
    let table = common::clean_scenario(72);
    let config = MrConfig::default();
    let single = table.subset(&[3]);
    let v = &single.variants()[0];
    let result = run_method(Method::WaldRatio, &single, &config, &mut method_rng(1, Method::WaldRatio))
        .expect("wald ratio");
    assert!((result.beta - v.beta_out / v.beta_exp).abs() < 1e-12);
    assert_eq!(result.nsnp, 1);

    let err = run_method(Method::WaldRatio, &table, &config, &mut method_rng(1, Method::WaldRatio))
        .expect_err("many variants");
    assert!(matches!(err, MrError::InvalidArgument(_)));
}

#[test]
fn wald_ratio_follows_second_order_weights() {
    let table = common::clean_scenario(74);
    let single = table.subset(&[5]);
    let first = MrConfig::default();
    let second = MrConfig {
        second_order_weights: true,
        ..Default::default()
    };
    let mut rng = method_rng(1, Method::WaldRatio);
    let plain = run_method(Method::WaldRatio, &single, &first, &mut rng).expect("first order");
    let widened = run_method(Method::WaldRatio, &single, &second, &mut rng).expect("second order");
    assert_eq!(plain.beta, widened.beta);
    assert!(widened.se > plain.se);

    let rows = single_variant(&single, &second);
    assert!((rows[0].result.se - widened.se).abs() < 1e-12);
}

#[test]
fn method_streams_are_independent_of_the_selection() {
    let table = common::clean_scenario(73);
    let config = MrConfig {
        n_bootstrap: 200,
        ..Default::default()
    };
    let alone = run_methods(&table, &[Method::WeightedMedian], &config);
    let together = run_methods(&table, &[Method::Ivw, Method::WeightedMedian], &config);
    assert_eq!(alone[0], together[1]);
}

#[test]
fn full_analysis_from_summary_statistics() {
    let simulated = common::contaminated_scenario(74);
    let (exposure, outcome) = common::summary_tables(&simulated);
    let config = MrConfig {
        n_bootstrap: 300,
        n_simulations: 500,
        n_samples: 2000,
        burn_in: 500,
        ..Default::default()
    };
    let report = analyze(&exposure, &outcome, &Method::ALL, &config).expect("analysis");
    assert_eq!(report.harmonization.n_kept, 20);
    assert_eq!(report.table.len(), 20);
    assert_eq!(report.results.len(), Method::ALL.len());
    for item in &report.results {
        let result = item.result.as_ref().expect("estimate");
        assert_eq!(result.method, item.method);
        assert!(result.beta.is_finite());
    }
    let het = report.heterogeneity.as_ref().expect("heterogeneity");
    assert!(het.pval < 0.05);

    let again = analyze(&exposure, &outcome, &Method::ALL, &config).expect("analysis");
    assert_eq!(report, again);

    let frame = estimates_table(&report.results).expect("table");
    assert_eq!(frame.height(), Method::ALL.len());
    assert_eq!(frame.width(), 9);
}

#[test]
fn sensitivity_tables() {
    let table = common::clean_scenario(75);
    let config = MrConfig::default();
    let loo = leave_one_out(&table, Method::Egger, &config).expect("loo");
    let frame = leave_one_out_table(&loo).expect("table");
    assert_eq!(frame.height(), 20);
    assert!(frame.column("excluded").is_ok());

    let frame = single_variant_table(&single_variant(&table, &config)).expect("table");
    assert_eq!(frame.height(), 20);
    assert_eq!(frame.column("OR").expect("OR").null_count(), 0);
}
