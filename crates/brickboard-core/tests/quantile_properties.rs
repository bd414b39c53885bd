//! Property tests for classification and smoothing

use brickboard_core::analytics::stats::rolling_mean;
use brickboard_core::analytics::{classify, project, ClassifyParams, CohortPoint, CohortSeries, Phase, ProjectionParams};
use brickboard_core::models::{add_months, Cohort};
use brickboard_core::{Level, Quantiles, UsageRecord};
use chrono::NaiveDate;
use proptest::prelude::*;
use std::collections::BTreeSet;

const OPPORTUNITIES: u32 = 100;

/// One unit per event count; every unit gets the same number of suggestions
fn records_for(events: &BTreeSet<u32>) -> Vec<UsageRecord> {
    let month = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    events
        .iter()
        .enumerate()
        .flat_map(|(unit, &used)| {
            (0..OPPORTUNITIES).map(move |i| UsageRecord {
                brick: format!("B{}", unit),
                mini_brick_code: format!("U{:03}", unit),
                business_unit: "AZ_RESPI_INH".to_string(),
                content_type: None,
                usage_count: u32::from(i < used),
                month,
            })
        })
        .collect()
}

fn params(low: f64, high: f64) -> ClassifyParams<'static> {
    ClassifyParams {
        business_unit: "AZ_RESPI_INH",
        quantiles: Quantiles { low, high },
        usage_threshold: 0,
        content_type: None,
        level: Level::MiniBrick,
        histogram_bins: 20,
    }
}

fn series(cohort: Cohort, values: &[f64]) -> CohortSeries {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    CohortSeries {
        cohort,
        points: values
            .iter()
            .enumerate()
            .map(|(i, v)| CohortPoint {
                month: add_months(start, i as u32).unwrap(),
                phase: if i < values.len() / 2 { Phase::History } else { Phase::Forecast },
                units: 1,
                average_sales: Some(*v),
                rolling_mean: Some(*v),
            })
            .collect(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_cohort_sizes_follow_quantiles(
        events in prop::collection::btree_set(0u32..=OPPORTUNITIES, 5..40),
        low in 0.05f64..0.45,
        high in 0.55f64..0.95,
    ) {
        let n = events.len() as f64;
        let result = classify(&records_for(&events), &params(low, high)).unwrap();

        let above = result.count(Cohort::AboveHighQuantile) as f64;
        let below = result.count(Cohort::BelowLowQuantile) as f64;

        prop_assert!((above - (1.0 - high) * n).abs() <= 1.0, "above={} n={} high={}", above, n, high);
        prop_assert!((below - low * n).abs() <= 1.0, "below={} n={} low={}", below, n, low);
        prop_assert_eq!(result.units.len(), events.len());
    }

    #[test]
    fn prop_classify_is_idempotent(
        events in prop::collection::btree_set(0u32..=OPPORTUNITIES, 1..20),
    ) {
        let records = records_for(&events);
        let first = classify(&records, &params(0.2, 0.8)).unwrap();
        let second = classify(&records, &params(0.2, 0.8)).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_rates_stay_in_unit_interval(
        events in prop::collection::btree_set(0u32..=OPPORTUNITIES, 1..20),
    ) {
        let result = classify(&records_for(&events), &params(0.2, 0.8)).unwrap();
        for unit in &result.units {
            prop_assert!((0.0..=1.0).contains(&unit.usage_rate));
        }
    }

    #[test]
    fn prop_rolling_mean_matches_trailing_window(
        values in prop::collection::vec(0.0f64..1000.0, 1..30),
        window in 1usize..=12,
    ) {
        let input: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
        let rolled = rolling_mean(&input, window);

        for (i, value) in rolled.iter().enumerate() {
            if i + 1 < window {
                prop_assert_eq!(*value, None);
            } else {
                let expected = values[i + 1 - window..=i].iter().sum::<f64>() / window as f64;
                let actual = value.unwrap();
                prop_assert!((actual - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn prop_higher_threshold_never_sets_flag(
        low in prop::collection::vec(0.0f64..100.0, 4..12),
        high in prop::collection::vec(0.0f64..100.0, 4..12),
        threshold in 0.0f64..50.0,
        extra in 0.0f64..50.0,
    ) {
        let low = series(Cohort::BelowLowQuantile, &low);
        let high = series(Cohort::AboveHighQuantile, &high);
        let loose = project(&low, &high, &ProjectionParams { reg_threshold: threshold, forecast_horizon: 6 }).unwrap();
        let strict = project(&low, &high, &ProjectionParams { reg_threshold: threshold + extra, forecast_horizon: 6 }).unwrap();

        prop_assert!(loose.divergence || !strict.divergence);
    }

    #[test]
    fn prop_history_difference_is_high_minus_low(
        values in prop::collection::vec((0.0f64..100.0, 0.0f64..100.0), 4..12),
    ) {
        let (low_values, high_values): (Vec<f64>, Vec<f64>) = values.iter().copied().unzip();
        let low = series(Cohort::BelowLowQuantile, &low_values);
        let high = series(Cohort::AboveHighQuantile, &high_values);
        let projection = project(&low, &high, &ProjectionParams { reg_threshold: 3.0, forecast_horizon: 6 }).unwrap();

        for (row, (l, h)) in projection.history.iter().zip(values.iter()) {
            prop_assert_eq!(row.difference, Some(h - l));
        }
    }
}
