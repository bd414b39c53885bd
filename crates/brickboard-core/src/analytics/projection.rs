//! Trend projection of the cohort rolling means
//!
//! Fits a linear trend (month index → rolling mean) to the history of each
//! cohort, extends both past the recommendation date and tracks the gap
//! between them. The divergence flag is a fixed-threshold heuristic, not a
//! significance test.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::sales::{CohortSeries, Phase};
use super::stats::{linear_regression, mean, LinearFit};
use crate::config::{DashboardConfig, MAX_FORECAST_HORIZON};
use crate::error::CoreError;
use crate::models::{add_months, month_range, months_between, Cohort};

/// Inputs of [`project`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    /// Divergence fires when |final projected gap| exceeds this
    pub reg_threshold: f64,
    /// Minimum months projected past the last history month
    pub forecast_horizon: usize,
}

impl ProjectionParams {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            reg_threshold: config.reg_threshold,
            forecast_horizon: config.forecast_horizon,
        }
    }
}

/// Linear trend of one cohort over its history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFit {
    pub cohort: Cohort,
    /// Change of the rolling mean per month
    pub slope: f64,
    /// Value at the first month of the axis
    pub intercept: f64,
    /// Confidence (R² coefficient, 0.0-1.0)
    pub r_squared: f64,
    pub history_points: usize,
}

impl TrendFit {
    pub fn predict(&self, period: i64) -> f64 {
        self.slope * period as f64 + self.intercept
    }
}

/// One history month with observed rolling means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub month: NaiveDate,
    /// Months since the start of the axis
    pub period: i64,
    pub low: Option<f64>,
    pub high: Option<f64>,
    /// `high - low`, `None` unless both are observed
    pub difference: Option<f64>,
}

/// One forecast month with projected and, when available, actual values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub month: NaiveDate,
    pub period: i64,
    pub low_projected: f64,
    pub high_projected: f64,
    pub projected_difference: f64,
    pub low_actual: Option<f64>,
    pub high_actual: Option<f64>,
    pub actual_difference: Option<f64>,
}

/// Cohort gap for one month of the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferencePoint {
    pub month: NaiveDate,
    pub phase: Phase,
    pub difference: Option<f64>,
}

/// Result of [`project`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub low_trend: TrendFit,
    pub high_trend: TrendFit,
    pub history: Vec<HistoryRow>,
    pub forecast: Vec<ForecastRow>,
    /// Observed gap over history, projected gap over forecast
    pub difference: Vec<DifferencePoint>,
    /// Gap the divergence flag is decided on
    pub final_difference: Option<f64>,
    pub reg_threshold: f64,
    pub divergence: bool,
    /// Mean of (actual gap - projected gap) over forecast months with actuals
    pub observed_lift: Option<f64>,
}

/// Project both cohorts past the recommendation date
///
/// # Errors
/// `InsufficientHistory` when a cohort has fewer than two history months
/// with a rolling mean (low usage is checked first).
pub fn project(
    low: &CohortSeries,
    high: &CohortSeries,
    params: &ProjectionParams,
) -> Result<Projection, CoreError> {
    let Some(axis_start) = low
        .points
        .iter()
        .chain(high.points.iter())
        .map(|p| p.month)
        .min()
    else {
        return Err(CoreError::InsufficientHistory {
            cohort: Cohort::BelowLowQuantile,
            points: 0,
        });
    };

    let low_trend = fit_history(low, axis_start)?;
    let high_trend = fit_history(high, axis_start)?;

    let timeline = merged_timeline(low, high);
    let last_history = timeline
        .iter()
        .filter(|m| history_phase(low, high, **m))
        .max()
        .copied();
    // Both fits succeeded, so at least two history months exist
    let Some(last_history) = last_history else {
        return Err(CoreError::InsufficientHistory {
            cohort: Cohort::BelowLowQuantile,
            points: 0,
        });
    };

    let history: Vec<HistoryRow> = timeline
        .iter()
        .filter(|m| **m <= last_history)
        .map(|&month| {
            let low_value = rolling_at(low, month);
            let high_value = rolling_at(high, month);
            HistoryRow {
                month,
                period: months_between(axis_start, month),
                low: low_value,
                high: high_value,
                difference: high_value.zip(low_value).map(|(h, l)| h - l),
            }
        })
        .collect();

    let last_observed = timeline.last().copied().unwrap_or(last_history);
    let horizon = horizon_months(params.forecast_horizon)?;
    let horizon_end = add_months(last_history, horizon)
        .ok_or_else(|| CoreError::InvalidConfig {
            message: format!(
                "forecast horizon of {} months runs past the calendar",
                params.forecast_horizon
            ),
        })?
        .max(last_observed);

    let forecast: Vec<ForecastRow> = add_months(last_history, 1)
        .into_iter()
        .flat_map(|first| month_range(first, horizon_end))
        .map(|month| {
            let period = months_between(axis_start, month);
            let low_projected = low_trend.predict(period);
            let high_projected = high_trend.predict(period);
            let low_actual = rolling_at(low, month);
            let high_actual = rolling_at(high, month);

            ForecastRow {
                month,
                period,
                low_projected,
                high_projected,
                projected_difference: high_projected - low_projected,
                low_actual,
                high_actual,
                actual_difference: high_actual.zip(low_actual).map(|(h, l)| h - l),
            }
        })
        .collect();

    let difference: Vec<DifferencePoint> = history
        .iter()
        .map(|row| DifferencePoint {
            month: row.month,
            phase: Phase::History,
            difference: row.difference,
        })
        .chain(forecast.iter().map(|row| DifferencePoint {
            month: row.month,
            phase: Phase::Forecast,
            difference: Some(row.projected_difference),
        }))
        .collect();

    let final_difference = match forecast.last() {
        Some(row) => Some(row.projected_difference),
        None => history.iter().rev().find_map(|row| row.difference),
    };
    let divergence = final_difference.is_some_and(|d| d.abs() > params.reg_threshold);

    let lifts: Vec<f64> = forecast
        .iter()
        .filter_map(|row| row.actual_difference.map(|actual| actual - row.projected_difference))
        .collect();
    let observed_lift = mean(&lifts);

    tracing::info!(
        history = history.len(),
        forecast = forecast.len(),
        final_difference = ?final_difference,
        divergence,
        "Projected cohort trends"
    );

    Ok(Projection {
        low_trend,
        high_trend,
        history,
        forecast,
        difference,
        final_difference,
        reg_threshold: params.reg_threshold,
        divergence,
        observed_lift,
    })
}

/// Horizon as a month count, bounded like the config
fn horizon_months(horizon: usize) -> Result<u32, CoreError> {
    u32::try_from(horizon)
        .ok()
        .filter(|_| horizon <= MAX_FORECAST_HORIZON)
        .ok_or_else(|| CoreError::InvalidConfig {
            message: format!(
                "forecast_horizon must be at most {} months (got {})",
                MAX_FORECAST_HORIZON, horizon
            ),
        })
}

fn fit_history(series: &CohortSeries, axis_start: NaiveDate) -> Result<TrendFit, CoreError> {
    let points: Vec<(f64, f64)> = series
        .points
        .iter()
        .filter(|p| p.phase == Phase::History)
        .filter_map(|p| Some((months_between(axis_start, p.month) as f64, p.rolling_mean?)))
        .collect();

    let insufficient = || CoreError::InsufficientHistory {
        cohort: series.cohort,
        points: points.len(),
    };

    if points.len() < 2 {
        return Err(insufficient());
    }
    let LinearFit {
        slope,
        intercept,
        r_squared,
    } = linear_regression(&points).ok_or_else(insufficient)?;

    tracing::debug!(
        cohort = %series.cohort,
        slope,
        intercept,
        r_squared,
        "Fitted history trend"
    );

    Ok(TrendFit {
        cohort: series.cohort,
        slope,
        intercept,
        r_squared,
        history_points: points.len(),
    })
}

/// Sorted union of the months of both series
fn merged_timeline(low: &CohortSeries, high: &CohortSeries) -> Vec<NaiveDate> {
    let mut months: Vec<NaiveDate> = low
        .points
        .iter()
        .chain(high.points.iter())
        .map(|p| p.month)
        .collect();
    months.sort_unstable();
    months.dedup();
    months
}

fn history_phase(low: &CohortSeries, high: &CohortSeries, month: NaiveDate) -> bool {
    low.point(month)
        .or_else(|| high.point(month))
        .is_some_and(|p| p.phase == Phase::History)
}

fn rolling_at(series: &CohortSeries, month: NaiveDate) -> Option<f64> {
    series.point(month).and_then(|p| p.rolling_mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::sales::CohortPoint;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    /// Series starting January 2024 with History up to and including `history_months`
    fn series(cohort: Cohort, values: &[Option<f64>], history_months: usize) -> CohortSeries {
        CohortSeries {
            cohort,
            points: values
                .iter()
                .enumerate()
                .map(|(i, v)| CohortPoint {
                    month: add_months(month(2024, 1), i as u32).unwrap(),
                    phase: if i < history_months {
                        Phase::History
                    } else {
                        Phase::Forecast
                    },
                    units: usize::from(v.is_some()),
                    average_sales: *v,
                    rolling_mean: *v,
                })
                .collect(),
        }
    }

    fn params(reg_threshold: f64, forecast_horizon: usize) -> ProjectionParams {
        ProjectionParams {
            reg_threshold,
            forecast_horizon,
        }
    }

    fn values(v: &[f64]) -> Vec<Option<f64>> {
        v.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_parallel_trends_do_not_diverge() {
        let low = series(Cohort::BelowLowQuantile, &values(&[10.0, 11.0, 12.0, 13.0]), 4);
        let high = series(Cohort::AboveHighQuantile, &values(&[12.0, 13.0, 14.0, 15.0]), 4);

        let result = project(&low, &high, &params(3.0, 6)).unwrap();

        assert_eq!(result.history.len(), 4);
        assert_eq!(result.forecast.len(), 6);
        assert!((result.low_trend.slope - 1.0).abs() < 1e-9);
        assert!((result.high_trend.r_squared - 1.0).abs() < 1e-9);
        for row in &result.forecast {
            assert!((row.projected_difference - 2.0).abs() < 1e-9);
        }
        assert!(!result.divergence);
        assert_eq!(result.observed_lift, None);
    }

    #[test]
    fn test_diverging_trends_flagged() {
        let low = series(Cohort::BelowLowQuantile, &values(&[10.0, 10.0, 10.0]), 3);
        let high = series(Cohort::AboveHighQuantile, &values(&[10.0, 11.0, 12.0]), 3);

        // Period of the last forecast month is 2 + 6 = 8, so the gap is 8
        let result = project(&low, &high, &params(3.0, 6)).unwrap();
        let last = result.forecast.last().unwrap();
        assert!((last.projected_difference - 8.0).abs() < 1e-9);
        assert!(result.divergence);

        let strict = project(&low, &high, &params(8.5, 6)).unwrap();
        assert!(!strict.divergence);
    }

    #[test]
    fn test_history_and_forecast_partition_timeline() {
        let low = series(Cohort::BelowLowQuantile, &values(&[1.0, 2.0, 3.0, 4.0, 5.0]), 3);
        let high = series(Cohort::AboveHighQuantile, &values(&[2.0, 3.0, 4.0, 5.0, 9.0]), 3);

        let result = project(&low, &high, &params(3.0, 1)).unwrap();

        // Observed data reaches past the horizon, so the forecast covers it
        let months: Vec<NaiveDate> = result
            .history
            .iter()
            .map(|r| r.month)
            .chain(result.forecast.iter().map(|r| r.month))
            .collect();
        let expected: Vec<NaiveDate> = (0..5).filter_map(|i| add_months(month(2024, 1), i)).collect();
        assert_eq!(months, expected);
        assert_eq!(result.difference.len(), 5);
        assert_eq!(result.difference[3].phase, Phase::Forecast);
    }

    #[test]
    fn test_horizon_beyond_bound_is_rejected() {
        let low = series(Cohort::BelowLowQuantile, &values(&[10.0, 11.0, 12.0]), 3);
        let high = series(Cohort::AboveHighQuantile, &values(&[12.0, 13.0, 14.0]), 3);

        let longest = project(&low, &high, &params(3.0, MAX_FORECAST_HORIZON)).unwrap();
        assert_eq!(longest.forecast.len(), MAX_FORECAST_HORIZON);

        // Neither wrapped to a zero horizon nor looping at the end of the calendar
        for horizon in [MAX_FORECAST_HORIZON + 1, 4_000_000, u32::MAX as usize + 1] {
            assert!(matches!(
                project(&low, &high, &params(3.0, horizon)),
                Err(CoreError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn test_observed_lift_uses_actual_forecast_months() {
        let low = series(Cohort::BelowLowQuantile, &values(&[1.0, 2.0, 3.0, 4.0]), 2);
        let high = series(Cohort::AboveHighQuantile, &values(&[2.0, 3.0, 6.0, 7.0]), 2);

        let result = project(&low, &high, &params(3.0, 2)).unwrap();

        // Projected gap stays 1; actual gaps are 3 and 3
        let actuals: Vec<Option<f64>> = result.forecast.iter().map(|r| r.actual_difference).collect();
        assert_eq!(actuals, vec![Some(3.0), Some(3.0)]);
        assert!((result.observed_lift.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_difference_requires_both_cohorts() {
        let low = series(Cohort::BelowLowQuantile, &[Some(1.0), None, Some(3.0), Some(4.0)], 4);
        let high = series(Cohort::AboveHighQuantile, &values(&[2.0, 3.0, 4.0, 5.0]), 4);

        let result = project(&low, &high, &params(3.0, 0)).unwrap();
        let diffs: Vec<Option<f64>> = result.history.iter().map(|r| r.difference).collect();
        assert_eq!(diffs, vec![Some(1.0), None, Some(1.0), Some(1.0)]);
        assert!(result.forecast.is_empty());
        // Without forecast months the last observed gap decides
        assert_eq!(result.final_difference, Some(1.0));
    }

    #[test]
    fn test_rec_date_after_data_projects_from_history_alone() {
        let low = series(Cohort::BelowLowQuantile, &values(&[5.0, 6.0]), 2);
        let high = series(Cohort::AboveHighQuantile, &values(&[5.0, 7.0]), 2);

        let result = project(&low, &high, &params(3.0, 6)).unwrap();
        assert_eq!(result.history.len(), 2);
        assert_eq!(result.forecast.len(), 6);
        assert!(result.forecast.iter().all(|r| r.actual_difference.is_none()));
    }

    #[test]
    fn test_insufficient_history_names_cohort() {
        let low = series(Cohort::BelowLowQuantile, &values(&[5.0, 6.0, 7.0]), 3);
        let high = series(Cohort::AboveHighQuantile, &[None, None, Some(7.0)], 3);

        match project(&low, &high, &params(3.0, 6)).unwrap_err() {
            CoreError::InsufficientHistory { cohort, points } => {
                assert_eq!(cohort, Cohort::AboveHighQuantile);
                assert_eq!(points, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_low_cohort_checked_first() {
        let low = series(Cohort::BelowLowQuantile, &[None, None], 2);
        let high = series(Cohort::AboveHighQuantile, &[None, None], 2);
        assert!(matches!(
            project(&low, &high, &params(3.0, 6)),
            Err(CoreError::InsufficientHistory {
                cohort: Cohort::BelowLowQuantile,
                points: 0
            })
        ));
    }

    #[test]
    fn test_raising_threshold_never_sets_flag() {
        let low = series(Cohort::BelowLowQuantile, &values(&[3.0, 2.0, 4.0, 1.0]), 4);
        let high = series(Cohort::AboveHighQuantile, &values(&[5.0, 9.0, 6.0, 12.0]), 4);

        let mut previous = true;
        for threshold in [0.0, 1.0, 2.5, 5.0, 10.0, 50.0, 1000.0] {
            let flag = project(&low, &high, &params(threshold, 6)).unwrap().divergence;
            assert!(previous || !flag, "flag turned on at threshold {}", threshold);
            previous = flag;
        }
    }
}
