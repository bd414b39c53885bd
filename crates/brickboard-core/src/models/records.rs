//! Typed input records, validated at the loader boundary
//!
//! Column lookups happen exactly once here. Past this point the pipeline only
//! sees `UsageRecord` / `SalesRecord`, so a schema mismatch is reported as
//! `MissingColumn` before any aggregation starts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::period::{month_start, parse_date};
use super::table::{DatasetKind, RawTable};
use crate::config::Level;
use crate::error::CoreError;

/// Required columns of the suggestions dataset, in schema order
pub const USAGE_COLUMNS: [&str; 6] = [
    "brick",
    "mini_brick_code",
    "business_unit",
    "content_type",
    "usage_count",
    "month",
];

/// Required columns of the sales dataset, in schema order
pub const SALES_COLUMNS: [&str; 6] = [
    "brick",
    "mini_brick",
    "business_unit",
    "product_name",
    "sales_month",
    "sales",
];

/// One suggestion made to a unit (an opportunity) and how often it was used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub brick: String,
    pub mini_brick_code: String,
    pub business_unit: String,
    /// Content type tag (e.g. "VAE", "iDetail"), absent when blank
    pub content_type: Option<String>,
    pub usage_count: u32,
    /// First day of the month the suggestion belongs to
    pub month: NaiveDate,
}

impl UsageRecord {
    /// Unit key at the requested granularity
    pub fn unit_key(&self, level: Level) -> &str {
        match level {
            Level::Brick => &self.brick,
            Level::MiniBrick => &self.mini_brick_code,
        }
    }
}

/// Sales quantity of one product in one unit for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub brick: String,
    pub mini_brick: String,
    pub business_unit: String,
    pub product_name: String,
    /// First day of the sales month
    pub month: NaiveDate,
    pub sales: f64,
}

impl SalesRecord {
    /// Unit key at the requested granularity
    pub fn unit_key(&self, level: Level) -> &str {
        match level {
            Level::Brick => &self.brick,
            Level::MiniBrick => &self.mini_brick,
        }
    }
}

/// Convert a suggestions table into typed records
pub fn usage_records_from_table(table: &RawTable) -> Result<Vec<UsageRecord>, CoreError> {
    let idx = table.require_columns(&USAGE_COLUMNS)?;
    let kind = table.kind();

    table
        .rows()
        .iter()
        .enumerate()
        .map(|(row, record)| -> Result<UsageRecord, CoreError> {
            let cell = |i: usize| record.get(idx[i]).unwrap_or("");
            let content_type = cell(3);

            Ok(UsageRecord {
                brick: cell(0).to_string(),
                mini_brick_code: cell(1).to_string(),
                business_unit: cell(2).to_string(),
                content_type: (!content_type.is_empty()).then(|| content_type.to_string()),
                usage_count: parse_usage_count(cell(4))
                    .ok_or_else(|| invalid(kind, row, USAGE_COLUMNS[4], cell(4), "expected a non-negative count or boolean flag"))?,
                month: parse_month(cell(5))
                    .ok_or_else(|| invalid(kind, row, USAGE_COLUMNS[5], cell(5), "expected a date"))?,
            })
        })
        .collect()
}

/// Convert a sales table into typed records
pub fn sales_records_from_table(table: &RawTable) -> Result<Vec<SalesRecord>, CoreError> {
    let idx = table.require_columns(&SALES_COLUMNS)?;
    let kind = table.kind();

    table
        .rows()
        .iter()
        .enumerate()
        .map(|(row, record)| -> Result<SalesRecord, CoreError> {
            let cell = |i: usize| record.get(idx[i]).unwrap_or("");

            Ok(SalesRecord {
                brick: cell(0).to_string(),
                mini_brick: cell(1).to_string(),
                business_unit: cell(2).to_string(),
                product_name: cell(3).to_string(),
                month: parse_month(cell(4))
                    .ok_or_else(|| invalid(kind, row, SALES_COLUMNS[4], cell(4), "expected a date"))?,
                sales: cell(5)
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| invalid(kind, row, SALES_COLUMNS[5], cell(5), "expected a finite number"))?,
            })
        })
        .collect()
}

fn parse_month(value: &str) -> Option<NaiveDate> {
    parse_date(value).map(month_start)
}

/// Usage counts arrive as integers, floats ("2.0") or boolean flags
fn parse_usage_count(value: &str) -> Option<u32> {
    match value.to_ascii_lowercase().as_str() {
        "true" => return Some(1),
        "false" => return Some(0),
        _ => {}
    }
    if let Ok(count) = value.parse::<u32>() {
        return Some(count);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32)
}

fn invalid(kind: DatasetKind, row: usize, column: &str, value: &str, reason: &str) -> CoreError {
    CoreError::InvalidValue {
        dataset: kind,
        // 1-based data row, header excluded
        row: row + 1,
        column: column.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
