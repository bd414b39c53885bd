//! Chart-ready series
//!
//! Plain data for any renderer: the CLI draws sparklines from it, `--json`
//! hands it to external plotting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::classifier::UsageDistribution;
use super::projection::{ForecastRow, Projection};
use super::ranking::RankedUnit;
use super::sales::{CohortPoint, CohortSeries, SalesAggregation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub month: NaiveDate,
    pub value: Option<f64>,
}

/// One named line of a chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub points: Vec<ChartPoint>,
}

impl ChartSeries {
    fn from_series(name: String, series: &CohortSeries, value: impl Fn(&CohortPoint) -> Option<f64>) -> Self {
        Self {
            name,
            points: series
                .points
                .iter()
                .map(|p| ChartPoint {
                    month: p.month,
                    value: value(p),
                })
                .collect(),
        }
    }

    /// Defined values in month order
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().filter_map(|p| p.value).collect()
    }
}

/// Bar of the top-N chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarPoint {
    pub label: String,
    pub value: f64,
}

/// All charts of the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardCharts {
    pub usage_distribution: UsageDistribution,
    pub top_units: Vec<BarPoint>,
    /// Average sales per cohort
    pub average_sales: Vec<ChartSeries>,
    /// Rolling mean per cohort, plus projected lines when available
    pub rolling_mean: Vec<ChartSeries>,
    /// High minus low cohort gap
    pub difference: Option<ChartSeries>,
}

impl DashboardCharts {
    pub fn build(
        distribution: &UsageDistribution,
        ranking: &[RankedUnit],
        sales: &SalesAggregation,
        projection: Option<&Projection>,
    ) -> Self {
        let cohorts = [&sales.low, &sales.high];

        let average_sales = cohorts
            .iter()
            .map(|s| ChartSeries::from_series(s.cohort.to_string(), s, |p| p.average_sales))
            .collect();

        let mut rolling_mean: Vec<ChartSeries> = cohorts
            .iter()
            .map(|s| ChartSeries::from_series(s.cohort.to_string(), s, |p| p.rolling_mean))
            .collect();

        if let Some(projection) = projection {
            let projected = |name: &str, pick: fn(&ForecastRow) -> f64| ChartSeries {
                name: name.to_string(),
                points: projection
                    .forecast
                    .iter()
                    .map(|row| ChartPoint {
                        month: row.month,
                        value: Some(pick(row)),
                    })
                    .collect(),
            };
            rolling_mean.push(projected("low usage (projected)", |row| row.low_projected));
            rolling_mean.push(projected("high usage (projected)", |row| row.high_projected));
        }

        let difference = projection.map(|projection| ChartSeries {
            name: "difference".to_string(),
            points: projection
                .difference
                .iter()
                .map(|d| ChartPoint {
                    month: d.month,
                    value: d.difference,
                })
                .collect(),
        });

        Self {
            usage_distribution: distribution.clone(),
            top_units: ranking
                .iter()
                .map(|r| BarPoint {
                    label: r.unit.clone(),
                    value: r.usage_rate,
                })
                .collect(),
            average_sales,
            rolling_mean,
            difference,
        }
    }
}
