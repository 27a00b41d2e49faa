use mrkit::median::{weighted_median_interpolated, weighted_median_step};
use mrkit::mode::{kde_mode, silverman_bandwidth};
use mrkit::regression::weighted_linear_regression;
use mrkit::stats::{normal_pvalue, normal_quantile, pchisq_upper, qchisq, quantile, t_pvalue};
use mrkit::utils::{complement, is_strand_ambiguous};
use mrkit::{MrConfig, MrError};
use ndarray::array;

#[test]
fn normal_helpers() {
    assert!((normal_quantile(0.975) - 1.959964).abs() < 1e-5);
    assert!((normal_pvalue(1.959964, 1.0) - 0.05).abs() < 1e-5);
    assert_eq!(normal_pvalue(0.3, 0.0), 0.0);
    assert_eq!(normal_pvalue(0.0, 0.0), 1.0);
    assert!(normal_pvalue(f64::NAN, 1.0).is_nan());
    assert!((MrConfig::default().z_critical() - 1.959964).abs() < 1e-5);
}

#[test]
fn chi_squared_helpers() {
    assert!((qchisq(0.95, 1.0) - 3.841459).abs() < 1e-3);
    assert!((pchisq_upper(3.841459, 1.0) - 0.05).abs() < 1e-5);
    assert!(pchisq_upper(1.0, 0.0).is_nan());
}

#[test]
fn far_tail_p_values_stay_positive() {
    let p = pchisq_upper(200.0, 1.0);
    assert!(p > 0.0 && p < 1e-40);
    let p = pchisq_upper(400.0, 10.0);
    assert!(p > 0.0 && p < 1e-60);
    assert!((t_pvalue(2.228139, 10.0) - 0.05).abs() < 1e-5);
    let p = t_pvalue(1e4, 5.0);
    assert!(p > 0.0 && p < 1e-15);
}

#[test]
fn quantiles_interpolate() {
    assert_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 0.5), 2.5);
    assert_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 0.0), 1.0);
    assert!(quantile(&[], 0.5).is_nan());
}

#[test]
fn weighted_medians() {
    let values = [3.0, 1.0, 2.0];
    assert_eq!(weighted_median_step(&values, &[1.0, 1.0, 1.0]), 2.0);
    assert_eq!(weighted_median_step(&values, &[10.0, 1.0, 1.0]), 3.0);
    // Positions 1/6, 1/2, 5/6 put the median on the middle value.
    assert!((weighted_median_interpolated(&values, &[1.0, 1.0, 1.0]) - 2.0).abs() < 1e-12);
    let m = weighted_median_interpolated(&[1.0, 2.0], &[1.0, 1.0]);
    assert!((m - 1.5).abs() < 1e-12);
}

#[test]
fn kernel_density_mode() {
    let values = [0.0, 0.1, 0.05, 3.0];
    let weights = [0.25; 4];
    let h = silverman_bandwidth(&values, 0.5).expect("spread");
    let mode = kde_mode(&values, &weights, h);
    assert!(mode > -0.1 && mode < 0.2, "mode = {mode}");
    assert!(silverman_bandwidth(&[1.0, 1.0, 1.0], 1.0).is_none());
}

#[test]
fn weighted_regression_recovers_line() {
    let x = array![1.0, 2.0, 3.0, 4.0];
    let y = array![3.0, 5.0, 7.0, 9.0];
    let w = array![1.0, 2.0, 1.0, 2.0];
    let fit = weighted_linear_regression(&x, &y, &w).expect("fit");
    assert!((fit.slope - 2.0).abs() < 1e-12);
    assert!((fit.intercept - 1.0).abs() < 1e-12);
    assert!(fit.rss < 1e-20);
    assert_eq!(fit.df, 2.0);

    let err = weighted_linear_regression(&array![1.0, 1.0], &array![1.0, 2.0], &array![1.0, 1.0])
        .expect_err("constant regressor");
    assert!(matches!(err, MrError::SingularRegression(_)));
}

#[test]
fn allele_helpers() {
    assert_eq!(complement("ACGT").as_deref(), Some("TGCA"));
    assert_eq!(complement("N"), None);
    assert!(is_strand_ambiguous("A", "T"));
    assert!(is_strand_ambiguous("G", "C"));
    assert!(!is_strand_ambiguous("A", "G"));
}

#[test]
fn invalid_configuration_is_rejected() {
    let config = MrConfig {
        significance_level: 1.5,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(MrError::InvalidArgument(_))));
    let config = MrConfig {
        thin: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
    assert!(MrConfig::default().validate().is_ok());
}
