//! Usage classification
//!
//! Computes a usage rate per unit, derives population-wide quantile cutoffs
//! and assigns every unit one [`Cohort`]. Cutoffs use closed boundaries on
//! both sides: `rate >= high_cutoff` is high usage, `rate <= low_cutoff` is
//! low usage. If both hold (all rates equal) high usage wins.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::stats::quantile;
use crate::config::{DashboardConfig, Level, Quantiles};
use crate::error::CoreError;
use crate::models::{Cohort, DatasetKind, UsageRecord};

/// Inputs of [`classify`]
#[derive(Debug, Clone)]
pub struct ClassifyParams<'a> {
    /// Records outside this business unit are ignored
    pub business_unit: &'a str,
    pub quantiles: Quantiles,
    pub usage_threshold: u32,
    /// When set, only suggestions of this content type count as usage events
    pub content_type: Option<&'a str>,
    pub level: Level,
    pub histogram_bins: usize,
}

impl<'a> ClassifyParams<'a> {
    pub fn from_config(config: &'a DashboardConfig) -> Self {
        Self {
            business_unit: config.business_unit(),
            quantiles: config.quantiles,
            usage_threshold: config.usage_threshold,
            content_type: config.content_type.as_deref(),
            level: config.level,
            histogram_bins: config.histogram_bins,
        }
    }
}

/// Usage summary of one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitUsage {
    pub unit: String,
    /// Parent brick (equal to `unit` at brick level)
    pub brick: String,
    /// Suggestions that were used (and match the content filter)
    pub usage_events: u64,
    /// Suggestions made to the unit
    pub opportunities: u64,
    /// `usage_events / opportunities`, 0 when clipped by the usage threshold
    pub usage_rate: f64,
    /// Fewer usage events than the configured threshold
    pub below_threshold: bool,
    pub cohort: Cohort,
    /// "Above 0.8" / "Below 0.2", empty for the middle cohort
    pub quantile: Option<String>,
}

/// Usage of one unit in one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    pub unit: String,
    pub month: NaiveDate,
    pub usage_events: u64,
    pub opportunities: u64,
    pub usage_rate: f64,
    pub cohort: Cohort,
}

/// Cutoff values derived from the unit population
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileCutoffs {
    pub quantiles: Quantiles,
    pub low_cutoff: f64,
    pub high_cutoff: f64,
}

impl QuantileCutoffs {
    /// Closed-above / closed-below assignment, high usage first
    pub fn assign(&self, rate: f64) -> Cohort {
        if rate >= self.high_cutoff {
            Cohort::AboveHighQuantile
        } else if rate <= self.low_cutoff {
            Cohort::BelowLowQuantile
        } else {
            Cohort::Middle
        }
    }
}

/// One bar of the usage-rate histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub units: usize,
}

/// Chart data for the usage-rate distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageDistribution {
    pub bins: Vec<HistogramBin>,
    pub low_cutoff: f64,
    pub high_cutoff: f64,
}

/// Result of [`classify`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageClassification {
    pub level: Level,
    /// Every unit of the filtered input, sorted by unit key
    pub units: Vec<UnitUsage>,
    pub cutoffs: QuantileCutoffs,
    /// High usage units per month, by month then rate descending
    pub top_monthly: Vec<MonthlyUsage>,
    /// Low usage units per month, by month then rate descending
    pub bottom_monthly: Vec<MonthlyUsage>,
    pub distribution: UsageDistribution,
}

impl UsageClassification {
    /// Unit key → cohort
    pub fn cohort_map(&self) -> HashMap<&str, Cohort> {
        self.units
            .iter()
            .map(|u| (u.unit.as_str(), u.cohort))
            .collect()
    }

    pub fn count(&self, cohort: Cohort) -> usize {
        self.units.iter().filter(|u| u.cohort == cohort).count()
    }

    pub fn zero_usage_count(&self) -> usize {
        self.units.iter().filter(|u| u.usage_rate == 0.0).count()
    }
}

#[derive(Default)]
struct UsageAccumulator {
    events: u64,
    opportunities: u64,
}

impl UsageAccumulator {
    fn add(&mut self, is_event: bool) {
        self.opportunities += 1;
        if is_event {
            self.events += 1;
        }
    }

    fn rate(&self) -> f64 {
        if self.opportunities == 0 {
            0.0
        } else {
            self.events as f64 / self.opportunities as f64
        }
    }
}

/// Classify units by usage rate
///
/// # Errors
/// `EmptyInput` when no record belongs to the business unit.
pub fn classify(
    records: &[UsageRecord],
    params: &ClassifyParams<'_>,
) -> Result<UsageClassification, CoreError> {
    params.quantiles.validate()?;

    let filtered: Vec<&UsageRecord> = records
        .iter()
        .filter(|r| r.business_unit == params.business_unit)
        .collect();

    if filtered.is_empty() {
        return Err(CoreError::EmptyInput {
            dataset: DatasetKind::Suggestions,
            filter: format!("business unit {}", params.business_unit),
        });
    }

    let mut per_unit: BTreeMap<&str, (UsageAccumulator, &str)> = BTreeMap::new();
    let mut per_unit_month: BTreeMap<(&str, NaiveDate), UsageAccumulator> = BTreeMap::new();

    for &record in &filtered {
        let unit = record.unit_key(params.level);
        let is_event = is_usage_event(record, params.content_type);

        per_unit
            .entry(unit)
            .or_insert_with(|| (UsageAccumulator::default(), record.brick.as_str()))
            .0
            .add(is_event);
        per_unit_month
            .entry((unit, record.month))
            .or_default()
            .add(is_event);
    }

    // Rates first, cutoffs over the whole population, labels last
    let rated: Vec<(&str, &str, &UsageAccumulator, f64, bool)> = per_unit
        .iter()
        .map(|(unit, (acc, brick))| {
            let below_threshold = acc.events < params.usage_threshold as u64;
            let rate = if below_threshold { 0.0 } else { acc.rate() };
            (*unit, *brick, acc, rate, below_threshold)
        })
        .collect();

    let mut sorted_rates: Vec<f64> = rated.iter().map(|r| r.3).collect();
    sorted_rates.sort_by(f64::total_cmp);

    let cutoffs = QuantileCutoffs {
        quantiles: params.quantiles,
        low_cutoff: quantile(&sorted_rates, params.quantiles.low).unwrap_or(0.0),
        high_cutoff: quantile(&sorted_rates, params.quantiles.high).unwrap_or(0.0),
    };

    let units: Vec<UnitUsage> = rated
        .into_iter()
        .map(|(unit, brick, acc, rate, below_threshold)| {
            let cohort = cutoffs.assign(rate);
            UnitUsage {
                unit: unit.to_string(),
                brick: brick.to_string(),
                usage_events: acc.events,
                opportunities: acc.opportunities,
                usage_rate: rate,
                below_threshold,
                cohort,
                quantile: cohort.label(&params.quantiles),
            }
        })
        .collect();

    let cohorts: HashMap<&str, Cohort> = units.iter().map(|u| (u.unit.as_str(), u.cohort)).collect();
    let monthly_for = |wanted: Cohort| {
        let mut rows: Vec<MonthlyUsage> = per_unit_month
            .iter()
            .filter(|((unit, _), _)| cohorts.get(unit) == Some(&wanted))
            .map(|((unit, month), acc)| MonthlyUsage {
                unit: unit.to_string(),
                month: *month,
                usage_events: acc.events,
                opportunities: acc.opportunities,
                usage_rate: acc.rate(),
                cohort: wanted,
            })
            .collect();
        rows.sort_by(|a, b| {
            a.month
                .cmp(&b.month)
                .then(b.usage_rate.total_cmp(&a.usage_rate))
                .then_with(|| a.unit.cmp(&b.unit))
        });
        rows
    };
    let top_monthly = monthly_for(Cohort::AboveHighQuantile);
    let bottom_monthly = monthly_for(Cohort::BelowLowQuantile);

    let distribution = usage_distribution(&sorted_rates, params.histogram_bins, &cutoffs);

    tracing::info!(
        units = units.len(),
        high = top_monthly.len(),
        low = bottom_monthly.len(),
        low_cutoff = cutoffs.low_cutoff,
        high_cutoff = cutoffs.high_cutoff,
        "Classified units by usage rate"
    );

    Ok(UsageClassification {
        level: params.level,
        units,
        cutoffs,
        top_monthly,
        bottom_monthly,
        distribution,
    })
}

fn is_usage_event(record: &UsageRecord, content_type: Option<&str>) -> bool {
    if record.usage_count == 0 {
        return false;
    }
    match content_type {
        None => true,
        Some(wanted) => record
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.eq_ignore_ascii_case(wanted)),
    }
}

/// Equal-width histogram over [0, 1]; the last bin is closed on the right
fn usage_distribution(rates: &[f64], bins: usize, cutoffs: &QuantileCutoffs) -> UsageDistribution {
    let bins = bins.max(1);
    let width = 1.0 / bins as f64;
    let mut counts = vec![0usize; bins];

    for &rate in rates {
        let idx = ((rate / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }

    UsageDistribution {
        bins: counts
            .into_iter()
            .enumerate()
            .map(|(i, units)| HistogramBin {
                lower: i as f64 * width,
                upper: (i + 1) as f64 * width,
                units,
            })
            .collect(),
        low_cutoff: cutoffs.low_cutoff,
        high_cutoff: cutoffs.high_cutoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, 1).unwrap()
    }

    fn record(unit: &str, used: u32, content: &str, m: u32) -> UsageRecord {
        UsageRecord {
            brick: format!("B-{}", unit),
            mini_brick_code: unit.to_string(),
            business_unit: "AZ_RESPI_INH".to_string(),
            content_type: Some(content.to_string()),
            usage_count: used,
            month: month(m),
        }
    }

    fn params() -> ClassifyParams<'static> {
        ClassifyParams {
            business_unit: "AZ_RESPI_INH",
            quantiles: Quantiles { low: 0.25, high: 0.75 },
            usage_threshold: 0,
            content_type: None,
            level: Level::MiniBrick,
            histogram_bins: 10,
        }
    }

    /// Ten suggestions for `unit`, of which `used` were used
    fn unit_with_rate(unit: &str, used: usize) -> Vec<UsageRecord> {
        (0..10)
            .map(|i| record(unit, u32::from(i < used), "VAE", 1))
            .collect()
    }

    #[test]
    fn test_scenario_four_units() {
        let mut records = Vec::new();
        records.extend(unit_with_rate("U0", 0));
        records.extend(unit_with_rate("U1", 1));
        records.extend(unit_with_rate("U5", 5));
        records.extend(unit_with_rate("U9", 9));

        let result = classify(&records, &params()).unwrap();
        let cohorts = result.cohort_map();

        assert_eq!(cohorts["U9"], Cohort::AboveHighQuantile);
        assert_eq!(cohorts["U0"], Cohort::BelowLowQuantile);
        assert_eq!(cohorts["U1"], Cohort::Middle);
        assert_eq!(cohorts["U5"], Cohort::Middle);
        assert!((result.cutoffs.low_cutoff - 0.075).abs() < 1e-9);
        assert!((result.cutoffs.high_cutoff - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_cutoff_ties_are_inclusive() {
        let cutoffs = QuantileCutoffs {
            quantiles: Quantiles { low: 0.2, high: 0.8 },
            low_cutoff: 0.1,
            high_cutoff: 0.7,
        };
        assert_eq!(cutoffs.assign(0.7), Cohort::AboveHighQuantile);
        assert_eq!(cutoffs.assign(0.1), Cohort::BelowLowQuantile);
        assert_eq!(cutoffs.assign(0.4), Cohort::Middle);
    }

    #[test]
    fn test_equal_cutoffs_prefer_high_usage() {
        let cutoffs = QuantileCutoffs {
            quantiles: Quantiles { low: 0.2, high: 0.8 },
            low_cutoff: 0.0,
            high_cutoff: 0.0,
        };
        assert_eq!(cutoffs.assign(0.0), Cohort::AboveHighQuantile);
    }

    #[test]
    fn test_zero_usage_unit_is_kept() {
        let mut records = unit_with_rate("USED", 4);
        records.extend(unit_with_rate("IDLE", 0));

        let result = classify(&records, &params()).unwrap();
        let idle = result.units.iter().find(|u| u.unit == "IDLE").unwrap();

        assert_eq!(idle.usage_rate, 0.0);
        assert_eq!(idle.opportunities, 10);
        assert!(!idle.below_threshold);
        assert_eq!(result.zero_usage_count(), 1);
    }

    #[test]
    fn test_usage_threshold_clips_rate() {
        let mut records = unit_with_rate("LOW", 2);
        records.extend(unit_with_rate("HIGH", 6));

        let p = ClassifyParams {
            usage_threshold: 3,
            ..params()
        };
        let result = classify(&records, &p).unwrap();
        let low = result.units.iter().find(|u| u.unit == "LOW").unwrap();
        let high = result.units.iter().find(|u| u.unit == "HIGH").unwrap();

        assert!(low.below_threshold);
        assert_eq!(low.usage_rate, 0.0);
        assert_eq!(low.usage_events, 2);
        assert!(!high.below_threshold);
        assert!((high.usage_rate - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_content_type_filter_only_affects_numerator() {
        let records = vec![
            record("U1", 1, "VAE", 1),
            record("U1", 1, "iDetail", 1),
            record("U1", 0, "VAE", 1),
            record("U1", 1, "vae", 1),
        ];
        let p = ClassifyParams {
            content_type: Some("VAE"),
            ..params()
        };
        let result = classify(&records, &p).unwrap();
        let unit = &result.units[0];
        assert_eq!(unit.opportunities, 4);
        assert_eq!(unit.usage_events, 2);
        assert!((unit.usage_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_business_unit_filter_and_empty_input() {
        let mut other = record("U1", 1, "VAE", 1);
        other.business_unit = "SAN_MIX".into();

        let err = classify(&[other.clone()], &params()).unwrap_err();
        assert!(matches!(err, CoreError::EmptyInput { .. }));

        let mut records = unit_with_rate("U2", 3);
        records.push(other);
        let result = classify(&records, &params()).unwrap();
        assert_eq!(result.units.len(), 1);
        assert_eq!(result.units[0].unit, "U2");
    }

    #[test]
    fn test_monthly_tables_hold_only_their_cohort() {
        let mut records = Vec::new();
        for (unit, used) in [("A", 0), ("B", 2), ("C", 5), ("D", 8), ("E", 10)] {
            for m in [1, 2] {
                records.extend((0..10).map(|i| record(unit, u32::from(i < used), "VAE", m)));
            }
        }

        let result = classify(&records, &params()).unwrap();
        let cohorts = result.cohort_map();

        assert!(!result.top_monthly.is_empty());
        assert!(result
            .top_monthly
            .iter()
            .all(|row| cohorts[row.unit.as_str()] == Cohort::AboveHighQuantile));
        assert!(result
            .bottom_monthly
            .iter()
            .all(|row| cohorts[row.unit.as_str()] == Cohort::BelowLowQuantile));

        // Within a month rates are descending
        let january: Vec<f64> = result
            .top_monthly
            .iter()
            .filter(|r| r.month == month(1))
            .map(|r| r.usage_rate)
            .collect();
        assert!(january.windows(2).all(|w| w[0] >= w[1]));
        assert!(result.top_monthly.windows(2).all(|w| w[0].month <= w[1].month));
    }

    #[test]
    fn test_brick_level_groups_mini_bricks() {
        let mut records = unit_with_rate("MB1", 2);
        records.extend(unit_with_rate("MB2", 4));
        for r in records.iter_mut() {
            r.brick = "B1".into();
        }
        let p = ClassifyParams {
            level: Level::Brick,
            ..params()
        };
        let result = classify(&records, &p).unwrap();
        assert_eq!(result.units.len(), 1);
        assert_eq!(result.units[0].opportunities, 20);
        assert!((result.units[0].usage_rate - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_histogram_counts_every_unit() {
        let mut records = Vec::new();
        for (i, used) in [0, 3, 5, 10].iter().enumerate() {
            records.extend(unit_with_rate(&format!("U{}", i), *used));
        }
        let result = classify(&records, &params()).unwrap();
        let total: usize = result.distribution.bins.iter().map(|b| b.units).sum();

        assert_eq!(result.distribution.bins.len(), 10);
        assert_eq!(total, 4);
        // rate 1.0 lands in the last (closed) bin
        assert_eq!(result.distribution.bins[9].units, 1);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let mut records = Vec::new();
        for (i, used) in [1, 7, 3, 9, 0, 4].iter().enumerate() {
            records.extend(unit_with_rate(&format!("U{}", i), *used));
        }
        let first = classify(&records, &params()).unwrap();
        let second = classify(&records, &params()).unwrap();
        assert_eq!(first, second);
    }
}
