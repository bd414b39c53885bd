//! Sales aggregation by usage cohort
//!
//! Joins sales to the cohort assignment, tags each month as history or
//! forecast relative to the recommendation date, and builds one gapless
//! monthly series per compared cohort with its trailing rolling mean.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::classifier::UsageClassification;
use super::stats::{mean, rolling_mean};
use crate::config::{DashboardConfig, Level};
use crate::error::CoreError;
use crate::models::{month_range, Cohort, SalesRecord};

/// Position of a month relative to the recommendation date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// On or before the recommendation date
    History,
    /// After the recommendation date
    Forecast,
}

impl Phase {
    pub fn of(month: NaiveDate, rec_date: NaiveDate) -> Self {
        if month <= rec_date {
            Phase::History
        } else {
            Phase::Forecast
        }
    }
}

/// Inputs of [`aggregate`]
#[derive(Debug, Clone)]
pub struct SalesParams<'a> {
    pub business_unit: &'a str,
    pub product_name: &'a str,
    pub rec_date: NaiveDate,
    pub sales_level: Level,
    pub window: usize,
}

impl<'a> SalesParams<'a> {
    pub fn from_config(config: &'a DashboardConfig) -> Self {
        Self {
            business_unit: config.business_unit(),
            product_name: config.product_name(),
            rec_date: config.rec_date,
            sales_level: config.sales_level,
            window: config.window,
        }
    }
}

/// Total sales of one unit in one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitMonthSales {
    pub unit: String,
    pub month: NaiveDate,
    pub phase: Phase,
    pub sales: f64,
    pub cohort: Cohort,
}

/// Mean sales across all classified units for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAverage {
    pub month: NaiveDate,
    pub phase: Phase,
    pub units: usize,
    pub average_sales: f64,
}

/// One calendar month of a cohort series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortPoint {
    pub month: NaiveDate,
    pub phase: Phase,
    /// Units of the cohort with sales this month
    pub units: usize,
    /// Mean of per-unit sales, `None` when no unit reported
    pub average_sales: Option<f64>,
    /// Trailing rolling mean, `None` unless the whole window is populated
    pub rolling_mean: Option<f64>,
}

/// Monthly series of one cohort on the shared calendar axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSeries {
    pub cohort: Cohort,
    pub points: Vec<CohortPoint>,
}

impl CohortSeries {
    /// Months that carry an average
    pub fn observed(&self) -> impl Iterator<Item = &CohortPoint> {
        self.points.iter().filter(|p| p.average_sales.is_some())
    }

    pub fn point(&self, month: NaiveDate) -> Option<&CohortPoint> {
        self.points.iter().find(|p| p.month == month)
    }

    pub fn is_empty(&self) -> bool {
        self.observed().next().is_none()
    }
}

/// Result of [`aggregate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesAggregation {
    pub sales_level: Level,
    pub window: usize,
    /// Low usage units, per unit and month
    pub low_by_unit: Vec<UnitMonthSales>,
    /// High usage units, per unit and month
    pub high_by_unit: Vec<UnitMonthSales>,
    pub low: CohortSeries,
    pub high: CohortSeries,
    /// Average over every classified unit, middle cohort included
    pub overall_monthly: Vec<MonthlyAverage>,
    /// Every classified unit, per unit and month
    pub by_unit_month: Vec<UnitMonthSales>,
    /// Units with sales but no cohort
    pub unmatched_units: usize,
}

impl SalesAggregation {
    pub fn series(&self, cohort: Cohort) -> Option<&CohortSeries> {
        match cohort {
            Cohort::AboveHighQuantile => Some(&self.high),
            Cohort::BelowLowQuantile => Some(&self.low),
            Cohort::Middle => None,
        }
    }

    /// First and last month with any classified sales
    pub fn duration(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.overall_monthly.first()?.month;
        let last = self.overall_monthly.last()?.month;
        Some((first, last))
    }
}

/// Aggregate sales per cohort and month
///
/// # Errors
/// `InvalidWindow` for a zero window, `NoOverlap` when no sales row matches
/// the business unit and product, `InvalidConfig` when sales are finer
/// grained than the classification.
pub fn aggregate(
    classification: &UsageClassification,
    sales: &[SalesRecord],
    params: &SalesParams<'_>,
) -> Result<SalesAggregation, CoreError> {
    if params.window < 1 {
        return Err(CoreError::InvalidWindow {
            window: params.window,
        });
    }

    let filtered: Vec<&SalesRecord> = sales
        .iter()
        .filter(|r| r.business_unit == params.business_unit && r.product_name == params.product_name)
        .collect();

    if filtered.is_empty() {
        return Err(CoreError::NoOverlap {
            business_unit: params.business_unit.to_string(),
            product_name: params.product_name.to_string(),
        });
    }

    let cohorts = cohorts_at_level(classification, params.sales_level)?;

    // Sum per unit and month; several rows per unit appear when sales are
    // recorded below the join level
    let mut totals: BTreeMap<(&str, NaiveDate), f64> = BTreeMap::new();
    let mut unmatched: BTreeSet<&str> = BTreeSet::new();
    for &record in &filtered {
        let unit = record.unit_key(params.sales_level);
        if !cohorts.contains_key(unit) {
            unmatched.insert(unit);
            continue;
        }
        *totals.entry((unit, record.month)).or_insert(0.0) += record.sales;
    }

    if !unmatched.is_empty() {
        tracing::debug!(
            units = unmatched.len(),
            "Dropped sales of units without usage classification"
        );
    }

    let by_unit_month: Vec<UnitMonthSales> = totals
        .iter()
        .filter_map(|((unit, month), sales)| {
            let cohort = *cohorts.get(unit)?;
            Some(UnitMonthSales {
                unit: unit.to_string(),
                month: *month,
                phase: Phase::of(*month, params.rec_date),
                sales: *sales,
                cohort,
            })
        })
        .collect();

    let cohort_rows = |wanted: Cohort| -> Vec<UnitMonthSales> {
        by_unit_month
            .iter()
            .filter(|row| row.cohort == wanted)
            .cloned()
            .collect()
    };
    let low_by_unit = cohort_rows(Cohort::BelowLowQuantile);
    let high_by_unit = cohort_rows(Cohort::AboveHighQuantile);

    let axis = calendar_axis(low_by_unit.iter().chain(high_by_unit.iter()).map(|r| r.month));
    let low = cohort_series(Cohort::BelowLowQuantile, &low_by_unit, &axis, params);
    let high = cohort_series(Cohort::AboveHighQuantile, &high_by_unit, &axis, params);

    let overall_monthly = overall_average(&by_unit_month, params.rec_date);

    tracing::info!(
        rows = filtered.len(),
        months = axis.len(),
        low_units = distinct_units(&low_by_unit),
        high_units = distinct_units(&high_by_unit),
        "Aggregated sales by cohort"
    );

    Ok(SalesAggregation {
        sales_level: params.sales_level,
        window: params.window,
        low_by_unit,
        high_by_unit,
        low,
        high,
        overall_monthly,
        by_unit_month,
        unmatched_units: unmatched.len(),
    })
}

/// Cohort per unit key at the sales granularity
///
/// Rolling mini-bricks up to bricks keeps a cohort only when every
/// classified mini-brick of the brick agrees on it.
fn cohorts_at_level(
    classification: &UsageClassification,
    sales_level: Level,
) -> Result<HashMap<&str, Cohort>, CoreError> {
    if sales_level == classification.level {
        return Ok(classification.cohort_map());
    }
    if sales_level.is_finer_than(classification.level) {
        return Err(CoreError::InvalidConfig {
            message: format!(
                "sales level {} is finer than usage level {}",
                sales_level, classification.level
            ),
        });
    }

    let mut rolled: HashMap<&str, Cohort> = HashMap::new();
    for unit in &classification.units {
        rolled
            .entry(unit.brick.as_str())
            .and_modify(|c| {
                if *c != unit.cohort {
                    *c = Cohort::Middle;
                }
            })
            .or_insert(unit.cohort);
    }
    Ok(rolled)
}

/// Every month from the earliest to the latest given month
fn calendar_axis(months: impl Iterator<Item = NaiveDate>) -> Vec<NaiveDate> {
    let seen: BTreeSet<NaiveDate> = months.collect();
    let (Some(&first), Some(&last)) = (seen.first(), seen.last()) else {
        return Vec::new();
    };

    month_range(first, last).collect()
}

fn cohort_series(
    cohort: Cohort,
    rows: &[UnitMonthSales],
    axis: &[NaiveDate],
    params: &SalesParams<'_>,
) -> CohortSeries {
    let mut per_month: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for row in rows {
        per_month.entry(row.month).or_default().push(row.sales);
    }

    let averages: Vec<Option<f64>> = axis
        .iter()
        .map(|m| per_month.get(m).and_then(|values| mean(values)))
        .collect();
    let rolling = rolling_mean(&averages, params.window);

    let points = axis
        .iter()
        .zip(averages)
        .zip(rolling)
        .map(|((month, average_sales), rolling_mean)| CohortPoint {
            month: *month,
            phase: Phase::of(*month, params.rec_date),
            units: per_month.get(month).map_or(0, Vec::len),
            average_sales,
            rolling_mean,
        })
        .collect();

    CohortSeries { cohort, points }
}

fn overall_average(rows: &[UnitMonthSales], rec_date: NaiveDate) -> Vec<MonthlyAverage> {
    let mut per_month: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for row in rows {
        per_month.entry(row.month).or_default().push(row.sales);
    }

    per_month
        .into_iter()
        .filter_map(|(month, values)| {
            Some(MonthlyAverage {
                month,
                phase: Phase::of(month, rec_date),
                units: values.len(),
                average_sales: mean(&values)?,
            })
        })
        .collect()
}

fn distinct_units(rows: &[UnitMonthSales]) -> usize {
    rows.iter().map(|r| r.unit.as_str()).collect::<BTreeSet<_>>().len()
}
