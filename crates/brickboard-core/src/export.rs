//! Export functionality for dashboard reports
//!
//! Every table of a [`DashboardReport`] becomes one CSV file in a target
//! directory; the whole report can also be written as a single JSON document.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::analytics::{CohortSeries, DashboardReport, Phase};
use crate::models::Cohort;

/// One row of `cohort_series.csv`
#[derive(Debug, Serialize)]
struct CohortSeriesRow {
    cohort: Cohort,
    month: NaiveDate,
    phase: Phase,
    units: usize,
    average_sales: Option<f64>,
    rolling_mean: Option<f64>,
}

/// One row of `trend_fits.csv`
#[derive(Debug, Serialize)]
struct TrendRow {
    cohort: Cohort,
    slope: f64,
    intercept: f64,
    r_squared: f64,
    history_points: usize,
    final_difference: Option<f64>,
    reg_threshold: f64,
    divergence: bool,
    observed_lift: Option<f64>,
}

/// Export every report table to CSV files in `dir`
///
/// Files: `statistics.csv`, `usage_units.csv`, `usage_top_monthly.csv`,
/// `usage_bottom_monthly.csv`, `usage_distribution.csv`, `top_units.csv`,
/// `sales_low_by_unit.csv`, `sales_high_by_unit.csv`, `sales_overall.csv`,
/// `cohort_series.csv`, plus `trend_fits.csv`, `projection_history.csv`,
/// `projection_forecast.csv` and `difference.csv` when the projection is
/// available.
///
/// # Errors
/// Returns error if directory creation or any write fails
///
/// # Examples
///
/// ```no_run
/// use brickboard_core::export::export_report_to_csv;
/// # fn run(report: &brickboard_core::DashboardReport) -> anyhow::Result<()> {
/// let written = export_report_to_csv(report, std::path::Path::new("out"))?;
/// println!("{} files", written.len());
/// # Ok(())
/// # }
/// ```
pub fn export_report_to_csv(report: &DashboardReport, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut written = vec![
        write_csv(dir, "statistics.csv", std::slice::from_ref(&report.statistics))?,
        write_csv(dir, "usage_units.csv", &report.usage.units)?,
        write_csv(dir, "usage_top_monthly.csv", &report.usage.top_monthly)?,
        write_csv(dir, "usage_bottom_monthly.csv", &report.usage.bottom_monthly)?,
        write_csv(dir, "usage_distribution.csv", &report.usage.distribution.bins)?,
        write_csv(dir, "top_units.csv", &report.top_units)?,
        write_csv(dir, "sales_low_by_unit.csv", &report.sales.low_by_unit)?,
        write_csv(dir, "sales_high_by_unit.csv", &report.sales.high_by_unit)?,
        write_csv(dir, "sales_overall.csv", &report.sales.overall_monthly)?,
    ];

    let series_rows: Vec<CohortSeriesRow> = [&report.sales.low, &report.sales.high]
        .into_iter()
        .flat_map(series_rows)
        .collect();
    written.push(write_csv(dir, "cohort_series.csv", &series_rows)?);

    if let Some(projection) = report.projection.projection() {
        let trends: Vec<TrendRow> = [&projection.low_trend, &projection.high_trend]
            .into_iter()
            .map(|fit| TrendRow {
                cohort: fit.cohort,
                slope: fit.slope,
                intercept: fit.intercept,
                r_squared: fit.r_squared,
                history_points: fit.history_points,
                final_difference: projection.final_difference,
                reg_threshold: projection.reg_threshold,
                divergence: projection.divergence,
                observed_lift: projection.observed_lift,
            })
            .collect();

        written.push(write_csv(dir, "trend_fits.csv", &trends)?);
        written.push(write_csv(dir, "projection_history.csv", &projection.history)?);
        written.push(write_csv(dir, "projection_forecast.csv", &projection.forecast)?);
        written.push(write_csv(dir, "difference.csv", &projection.difference)?);
    }

    tracing::info!(files = written.len(), dir = %dir.display(), "Exported report");

    Ok(written)
}

/// Export the whole report as pretty-printed JSON
pub fn export_report_to_json(report: &DashboardReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    std::fs::write(path, json)
        .with_context(|| format!("Failed to write JSON file: {}", path.display()))?;

    Ok(())
}

fn series_rows(series: &CohortSeries) -> impl Iterator<Item = CohortSeriesRow> + '_ {
    series.points.iter().map(|p| CohortSeriesRow {
        cohort: series.cohort,
        month: p.month,
        phase: p.phase,
        units: p.units,
        average_sales: p.average_sales,
        rolling_mean: p.rolling_mean,
    })
}

fn write_csv<T: Serialize>(dir: &Path, name: &str, rows: &[T]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV writer: {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::ProjectionOutcome;
    use crate::config::DashboardConfig;
    use crate::models::{SalesRecord, UsageRecord};
    use tempfile::TempDir;

    fn month(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, 1).unwrap()
    }

    fn report() -> DashboardReport {
        let usage: Vec<UsageRecord> = (0..5)
            .flat_map(|i| {
                (0..5).map(move |j| UsageRecord {
                    brick: "B1".into(),
                    mini_brick_code: format!("U{}", i),
                    business_unit: "AZ_RESPI_INH".into(),
                    content_type: None,
                    usage_count: u32::from(j < i),
                    month: month(1),
                })
            })
            .collect();
        let sales: Vec<SalesRecord> = (0..5)
            .flat_map(|i| {
                (1..=8).map(move |m| SalesRecord {
                    brick: "B1".into(),
                    mini_brick: format!("U{}", i),
                    business_unit: "AZ_RESPI_INH".into(),
                    product_name: "TRIXEO + IMP.".into(),
                    month: month(m),
                    sales: (i * 10 + m) as f64,
                })
            })
            .collect();
        let config = DashboardConfig {
            rec_date: month(5),
            window: 2,
            ..Default::default()
        };
        DashboardReport::compute(&config, &usage, &sales).unwrap()
    }

    #[test]
    fn test_export_writes_every_table() {
        let temp = TempDir::new().unwrap();
        let report = report();
        assert!(matches!(report.projection, ProjectionOutcome::Ready(_)));

        let written = export_report_to_csv(&report, temp.path()).unwrap();

        assert_eq!(written.len(), 14);
        for path in &written {
            assert!(path.exists(), "missing {}", path.display());
        }
    }

    #[test]
    fn test_usage_units_csv_content() {
        let temp = TempDir::new().unwrap();
        export_report_to_csv(&report(), temp.path()).unwrap();

        let content = std::fs::read_to_string(temp.path().join("usage_units.csv")).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "unit,brick,usage_events,opportunities,usage_rate,below_threshold,cohort,quantile"
        );
        assert_eq!(lines.count(), 5);
        assert!(content.contains("AboveHighQuantile"));
        assert!(content.contains("Above 0.8"));
    }

    #[test]
    fn test_cohort_series_csv_has_both_cohorts() {
        let temp = TempDir::new().unwrap();
        export_report_to_csv(&report(), temp.path()).unwrap();

        let content = std::fs::read_to_string(temp.path().join("cohort_series.csv")).unwrap();
        assert!(content.starts_with("cohort,month,phase,units,average_sales,rolling_mean"));
        assert!(content.contains("BelowLowQuantile,2024-01-01,history"));
        assert!(content.contains("AboveHighQuantile,2024-08-01,forecast"));
    }

    #[test]
    fn test_export_creates_nested_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("reports").join("trixeo");
        export_report_to_csv(&report(), &dir).unwrap();
        assert!(dir.join("statistics.csv").exists());
    }

    #[test]
    fn test_export_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("report.json");
        export_report_to_json(&report(), &path).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["statistics"]["total_units"], 5);
        assert_eq!(parsed["projection"]["status"], "ready");
    }
}
