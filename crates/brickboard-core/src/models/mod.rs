//! Data models for brickboard

pub mod cohort;
pub mod period;
pub mod records;
pub mod table;

pub use cohort::Cohort;
pub use period::{add_months, month_range, month_start, months_between, parse_date};
pub use records::{
    sales_records_from_table, usage_records_from_table, SalesRecord, UsageRecord,
    SALES_COLUMNS, USAGE_COLUMNS,
};
pub use table::{DatasetKind, RawTable};
