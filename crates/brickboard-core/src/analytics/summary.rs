//! Headline metrics of the dashboard

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::classifier::UsageClassification;
use super::sales::SalesAggregation;
use crate::models::Cohort;

/// Gross statistics shown above the detailed tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrossStatistics {
    pub total_units: usize,
    pub units_above: usize,
    pub units_below: usize,
    pub zero_usage_units: usize,
    /// First month of classified sales
    pub sales_start: Option<NaiveDate>,
    /// Last month of classified sales
    pub sales_end: Option<NaiveDate>,
    pub rec_date: NaiveDate,
    pub highest_rate: f64,
    pub lowest_rate: f64,
}

impl GrossStatistics {
    pub fn compute(
        classification: &UsageClassification,
        sales: &SalesAggregation,
        rec_date: NaiveDate,
    ) -> Self {
        let rates = classification.units.iter().map(|u| u.usage_rate);
        let highest_rate = rates.clone().fold(f64::NEG_INFINITY, f64::max);
        let lowest_rate = rates.fold(f64::INFINITY, f64::min);
        let duration = sales.duration();

        Self {
            total_units: classification.units.len(),
            units_above: classification.count(Cohort::AboveHighQuantile),
            units_below: classification.count(Cohort::BelowLowQuantile),
            zero_usage_units: classification.zero_usage_count(),
            sales_start: duration.map(|d| d.0),
            sales_end: duration.map(|d| d.1),
            rec_date,
            highest_rate: if highest_rate.is_finite() { highest_rate } else { 0.0 },
            lowest_rate: if lowest_rate.is_finite() { lowest_rate } else { 0.0 },
        }
    }

    /// Number of calendar months covered by sales, both ends included
    pub fn sales_months(&self) -> usize {
        match (self.sales_start, self.sales_end) {
            (Some(start), Some(end)) => {
                crate::models::months_between(start, end).max(0) as usize + 1
            }
            _ => 0,
        }
    }
}
