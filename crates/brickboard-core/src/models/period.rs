//! Calendar-month helpers
//!
//! Every period in brickboard is a month, represented by its first day.

use chrono::{Datelike, Months, NaiveDate};

/// Formats accepted for dates in datasets, config and CLI arguments
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d-%b-%Y", "%Y/%m/%d"];

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Parse a date in any supported format, including bare `YYYY-MM`
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
        // Datetime formats carry a time part NaiveDate rejects; take the date prefix
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }

    NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d").ok()
}

/// `date` shifted by `n` months (clamped to the end of shorter months)
///
/// `None` past the last representable date.
pub fn add_months(date: NaiveDate, n: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(n))
}

/// Consecutive months from `first` through `last`, inclusive
pub fn month_range(first: NaiveDate, last: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(first), |m| add_months(*m, 1)).take_while(move |m| *m <= last)
}

/// Signed number of whole months from `from` to `to`, ignoring days
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to.year() as i64 - from.year() as i64) * 12 + (to.month() as i64 - from.month() as i64)
}
