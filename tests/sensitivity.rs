mod common;

use mrkit::sensitivity::{
    funnel_asymmetry, heterogeneity, leave_one_out, rucker_q, single_variant, steiger_filtering,
};
use mrkit::{Method, MrConfig, MrError};

#[test]
fn heterogeneity_separates_clean_and_contaminated() {
    let config = MrConfig::default();
    let clean = heterogeneity(&common::clean_scenario(51), &config).expect("q");
    assert_eq!(clean.df, 19);
    assert!((0.0..=100.0).contains(&clean.i_squared));
    assert!((0.0..=1.0).contains(&clean.pval));

    let dirty = heterogeneity(&common::contaminated_scenario(51), &config).expect("q");
    assert!(dirty.pval < 0.05);
    assert!(dirty.i_squared > 50.0);
    assert!(dirty.q > clean.q);
}

#[test]
fn rucker_q_difference_is_non_negative() {
    let config = MrConfig::default();
    for seed in 0..5 {
        let q = rucker_q(&common::contaminated_scenario(60 + seed), &config).expect("rucker");
        assert!(q.q_diff >= -1e-9, "q_diff = {}", q.q_diff);
        assert!(q.q_egger <= q.q_ivw + 1e-9);
        assert!((0.0..=1.0).contains(&q.pval));
    }
}

#[test]
fn leave_one_out_covers_every_variant() {
    let table = common::clean_scenario(52);
    let rows = leave_one_out(&table, Method::Ivw, &MrConfig::default()).expect("loo");
    assert_eq!(rows.len(), table.len());
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.excluded_index, i);
        assert_eq!(row.excluded_id, table.variants()[i].id);
        let result = row.result.as_ref().expect("ivw on 19 variants");
        assert_eq!(result.nsnp, 19);
    }
}

#[test]
fn leave_one_out_reports_per_row_failures() {
    let table = common::clean_scenario(53).subset(&[0, 1, 2]);
    let rows = leave_one_out(&table, Method::WeightedMedian, &MrConfig::default()).expect("loo");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| matches!(
        r.result,
        Err(MrError::InsufficientInstruments { found: 2, .. })
    )));
}

#[test]
fn single_variant_estimates_are_wald_ratios() {
    let table = common::clean_scenario(54);
    let rows = single_variant(&table, &MrConfig::default());
    assert_eq!(rows.len(), table.len());
    for (row, v) in rows.iter().zip(table.variants()) {
        assert_eq!(row.id, v.id);
        assert_eq!(row.result.method, Method::WaldRatio);
        assert_eq!(row.result.nsnp, 1);
        assert!((row.result.beta - v.beta_out / v.beta_exp).abs() < 1e-12);
        assert!((row.result.se - v.se_out / v.beta_exp.abs()).abs() < 1e-12);
    }
}

#[test]
fn funnel_points_use_ratio_precision() {
    let table = common::clean_scenario(55);
    let funnel = funnel_asymmetry(&table, &MrConfig::default()).expect("funnel");
    assert_eq!(funnel.points.len(), 20);
    for (p, v) in funnel.points.iter().zip(table.variants()) {
        assert!((p.precision - v.beta_exp.abs() / v.se_out).abs() < 1e-9);
    }
    assert!(funnel.intercept_se > 0.0);
    assert!((0.0..=1.0).contains(&funnel.pval));
}

#[test]
fn steiger_keeps_variants_acting_through_the_exposure() {
    let table = common::clean_scenario(56);
    let result = steiger_filtering(&table, 10_000, 10_000, 0.0).expect("steiger");
    assert_eq!(result.variants.len(), 20);
    assert!(result.direction_correct);
    assert!(result.z > 0.0);
    let kept = result.variants.iter().filter(|v| v.correct_direction).count();
    assert_eq!(result.filtered.len(), kept);
    assert!(kept > 10);

    let err = steiger_filtering(&table, 3, 10_000, 0.0).expect_err("tiny sample");
    assert!(matches!(err, MrError::InvalidArgument(_)));
}
