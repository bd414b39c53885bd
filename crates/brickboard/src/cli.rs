//! Terminal rendering of the dashboard
//!
//! Every section of the report becomes a comfy-table, or the whole report
//! is dumped as JSON.

use anyhow::{Context, Result};
use brickboard_core::analytics::{
    CohortSeries, MonthlyUsage, Projection, RankedUnit, UnitUsage, UsageDistribution,
};
use brickboard_core::models::Cohort;
use brickboard_core::{ConfigLayer, DashboardConfig, DashboardReport, ProjectionOutcome, SourceConfig};
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use std::fmt::Write as _;

const BAR_WIDTH: usize = 40;

// ============================================================================
// Report
// ============================================================================

/// Render the full report, or its JSON form when `json` is set
pub fn format_report(report: &DashboardReport, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    }

    let config = &report.config;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} · {} level · {} line · recommendation {}\n",
        config.product_name(),
        config.level,
        config.sales_line,
        config.rec_date.format("%Y-%m-%d")
    );

    section(&mut out, "Overview");
    out.push_str(&format_statistics(report, no_color));

    section(&mut out, "Usage cutoffs");
    let cutoffs = &report.usage.cutoffs;
    let _ = writeln!(
        out,
        "low  (q={}): {}\nhigh (q={}): {}",
        cutoffs.quantiles.low,
        format_rate(cutoffs.low_cutoff),
        cutoffs.quantiles.high,
        format_rate(cutoffs.high_cutoff)
    );

    section(&mut out, "Usage by unit");
    out.push_str(&format_unit_usage(&report.usage.units, no_color));

    section(&mut out, "High usage units by month");
    out.push_str(&format_monthly_usage(&report.usage.top_monthly, no_color));

    section(&mut out, "Low usage units by month");
    out.push_str(&format_monthly_usage(&report.usage.bottom_monthly, no_color));

    section(&mut out, &format!("Top {} units", config.top_n));
    out.push_str(&format_ranking(&report.top_units, no_color));

    section(&mut out, "Usage distribution");
    out.push_str(&format_distribution(&report.usage.distribution));

    section(&mut out, &format!("Cohort sales (rolling {} months)", config.window));
    out.push_str(&format_cohort_sales(&report.sales.low, &report.sales.high, no_color));
    if report.sales.unmatched_units > 0 {
        let _ = writeln!(
            out,
            "\n{} usage units had no sales and were left out",
            report.sales.unmatched_units
        );
    }

    section(&mut out, "Projection");
    match &report.projection {
        ProjectionOutcome::Ready(projection) => {
            out.push_str(&format_projection(projection, no_color));
            if let Some(difference) = &report.charts.difference {
                let _ = writeln!(out, "Gap trend: {}", sparkline(&difference.values()));
            }
        }
        ProjectionOutcome::Unavailable { reason } => {
            let _ = writeln!(out, "Projection unavailable: {}", reason);
        }
    }

    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{}\n{}", title, "─".repeat(title.chars().count()));
}

fn format_statistics(report: &DashboardReport, no_color: bool) -> String {
    let stats = &report.statistics;
    let quantiles = &report.config.quantiles;
    let period = match (stats.sales_start, stats.sales_end) {
        (Some(start), Some(end)) => format!(
            "{} → {} ({} months)",
            start.format("%Y-%m"),
            end.format("%Y-%m"),
            stats.sales_months()
        ),
        _ => "-".to_string(),
    };

    let mut table = new_table(&["Metric", "Value"], no_color);
    let rows = [
        ("Units", stats.total_units.to_string()),
        (
            "High usage",
            format!("{} (≥ q{})", stats.units_above, quantiles.high),
        ),
        (
            "Low usage",
            format!("{} (≤ q{})", stats.units_below, quantiles.low),
        ),
        ("Never used", stats.zero_usage_units.to_string()),
        ("Highest rate", format_rate(stats.highest_rate)),
        ("Lowest rate", format_rate(stats.lowest_rate)),
        ("Sales period", period),
    ];
    for (name, value) in rows {
        table.add_row(Row::from(vec![name.to_string(), value]));
    }

    format!("{}\n", table)
}

fn format_unit_usage(units: &[UnitUsage], no_color: bool) -> String {
    if units.is_empty() {
        return "No units.\n".to_string();
    }

    let mut table = new_table(
        &["Unit", "Brick", "Events", "Suggestions", "Rate", "Quantile"],
        no_color,
    );
    for unit in units {
        let rate = if unit.below_threshold {
            format!("{} (below threshold)", format_rate(unit.usage_rate))
        } else {
            format_rate(unit.usage_rate)
        };
        table.add_row(Row::from(vec![
            truncate(&unit.unit, 24),
            truncate(&unit.brick, 24),
            format_number(unit.usage_events),
            format_number(unit.opportunities),
            rate,
            unit.quantile.clone().unwrap_or_else(|| "-".to_string()),
        ]));
    }

    format!("{}\n", table)
}

fn format_monthly_usage(rows: &[MonthlyUsage], no_color: bool) -> String {
    if rows.is_empty() {
        return "No units in this cohort.\n".to_string();
    }

    let mut table = new_table(&["Month", "Unit", "Events", "Suggestions", "Rate"], no_color);
    for row in rows {
        table.add_row(Row::from(vec![
            row.month.format("%Y-%m").to_string(),
            truncate(&row.unit, 24),
            format_number(row.usage_events),
            format_number(row.opportunities),
            format_rate(row.usage_rate),
        ]));
    }

    format!("{}\n", table)
}

fn format_ranking(ranking: &[RankedUnit], no_color: bool) -> String {
    if ranking.is_empty() {
        return "No high usage units.\n".to_string();
    }

    let mut table = new_table(&["#", "Unit", "Events", "Suggestions", "Rate", "Months"], no_color);
    for unit in ranking {
        table.add_row(Row::from(vec![
            unit.rank.to_string(),
            truncate(&unit.unit, 24),
            format_number(unit.usage_events),
            format_number(unit.opportunities),
            format_rate(unit.usage_rate),
            unit.months.to_string(),
        ]));
    }

    format!("{}\n", table)
}

fn format_distribution(distribution: &UsageDistribution) -> String {
    let max = distribution
        .bins
        .iter()
        .map(|b| b.units)
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for bin in &distribution.bins {
        let _ = writeln!(
            out,
            "{:>4.0}-{:<4.0}% {:<width$} {}",
            bin.lower * 100.0,
            bin.upper * 100.0,
            bar(bin.units, max, BAR_WIDTH),
            bin.units,
            width = BAR_WIDTH
        );
    }
    out
}

fn format_cohort_sales(low: &CohortSeries, high: &CohortSeries, no_color: bool) -> String {
    let mut table = new_table(
        &["Month", "Phase", "Low avg", "Low rolling", "High avg", "High rolling"],
        no_color,
    );

    // Both series share the same calendar axis
    for (low_point, high_point) in low.points.iter().zip(high.points.iter()) {
        table.add_row(Row::from(vec![
            low_point.month.format("%Y-%m").to_string(),
            format!("{:?}", low_point.phase).to_lowercase(),
            fmt_opt(low_point.average_sales),
            fmt_opt(low_point.rolling_mean),
            fmt_opt(high_point.average_sales),
            fmt_opt(high_point.rolling_mean),
        ]));
    }

    format!("{}\n", table)
}

fn format_projection(projection: &Projection, no_color: bool) -> String {
    let mut out = String::new();

    let mut trends = new_table(&["Cohort", "Slope / month", "Intercept", "R²", "Points"], no_color);
    for trend in [&projection.low_trend, &projection.high_trend] {
        trends.add_row(Row::from(vec![
            trend.cohort.to_string(),
            format!("{:+.2}", trend.slope),
            format!("{:.2}", trend.intercept),
            format!("{:.2}", trend.r_squared),
            trend.history_points.to_string(),
        ]));
    }
    let _ = writeln!(out, "{}\n", trends);

    let mut history = new_table(&["Month", "Period", "Low rolling", "High rolling", "Gap"], no_color);
    for row in &projection.history {
        history.add_row(Row::from(vec![
            row.month.format("%Y-%m").to_string(),
            row.period.to_string(),
            fmt_opt(row.low),
            fmt_opt(row.high),
            row.difference
                .map(|d| format!("{:+.2}", d))
                .unwrap_or_else(|| "-".to_string()),
        ]));
    }
    let _ = writeln!(out, "History\n{}\n", history);

    if projection.forecast.is_empty() {
        out.push_str("No forecast months.\n");
    } else {
        let mut forecast = new_table(
            &["Month", "Low proj.", "High proj.", "Gap proj.", "Gap actual"],
            no_color,
        );
        for row in &projection.forecast {
            forecast.add_row(Row::from(vec![
                row.month.format("%Y-%m").to_string(),
                format!("{:.2}", row.low_projected),
                format!("{:.2}", row.high_projected),
                format!("{:+.2}", row.projected_difference),
                row.actual_difference
                    .map(|d| format!("{:+.2}", d))
                    .unwrap_or_else(|| "-".to_string()),
            ]));
        }
        let _ = writeln!(out, "Forecast\n{}\n", forecast);
    }

    let _ = writeln!(out, "{}", divergence_table(projection, no_color));
    out
}

/// Verdict row; the verdict cell is green on divergence, yellow otherwise
fn divergence_table(projection: &Projection, no_color: bool) -> Table {
    let verdict = if projection.divergence {
        "● Cohorts diverge"
    } else {
        "○ No divergence"
    };
    let mut verdict = Cell::new(verdict);
    if !no_color {
        verdict = verdict.fg(if projection.divergence {
            Color::Green
        } else {
            Color::Yellow
        });
    }

    let mut table = new_table(&["Verdict", "Final gap", "Threshold", "Observed lift"], no_color);
    table.add_row(Row::from(vec![
        verdict,
        Cell::new(fmt_opt(projection.final_difference)),
        Cell::new(projection.reg_threshold),
        Cell::new(
            projection
                .observed_lift
                .map(|lift| format!("{:+.2}", lift))
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]));
    table
}

// ============================================================================
// Config
// ============================================================================

/// Resolved configuration as a TOML document that can be saved as config file
pub fn format_config(config: &DashboardConfig, source: &SourceConfig) -> Result<String> {
    let layer = ConfigLayer {
        data_location: Some(source.location.clone()),
        cache_ttl_secs: Some(source.cache_ttl.as_secs()),
        ..ConfigLayer::from(config)
    };
    let body = toml::to_string(&layer).context("Failed to serialize configuration")?;

    let labels = [Cohort::AboveHighQuantile, Cohort::BelowLowQuantile]
        .iter()
        .filter_map(|c| c.label(&config.quantiles))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "# business unit: {}, product: {}, cohorts: {}\n{}",
        config.business_unit(),
        config.product_name(),
        labels,
        body
    ))
}

// ============================================================================
// Helpers
// ============================================================================

fn new_table(headers: &[&str], no_color: bool) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    // Apply colors only if enabled
    if no_color {
        table.set_header(headers.to_vec());
    } else {
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }
    table
}

fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "-".to_string())
}

fn format_rate(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Format number with thousands separator
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

fn bar(value: usize, max: usize, width: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let filled = (value * width + max / 2) / max;
    "█".repeat(filled)
}

/// One block character per value, scaled between min and max
fn sparkline(values: &[f64]) -> String {
    const TICKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    values
        .iter()
        .map(|v| {
            if span <= f64::EPSILON {
                TICKS[0]
            } else {
                let idx = ((v - min) / span * (TICKS.len() - 1) as f64).round() as usize;
                TICKS[idx.min(TICKS.len() - 1)]
            }
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
