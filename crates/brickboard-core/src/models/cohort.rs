//! Usage cohorts

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Quantiles;

/// Usage-rate group a unit belongs to
///
/// Assigned once per unit from population-wide quantile cutoffs and never
/// re-derived downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cohort {
    /// Usage rate at or above the high quantile cutoff
    AboveHighQuantile,
    /// Usage rate at or below the low quantile cutoff
    BelowLowQuantile,
    /// Everything in between
    Middle,
}

impl Cohort {
    /// Dashboard label, e.g. "Above 0.8" / "Below 0.2"
    ///
    /// Middle units carry no label.
    pub fn label(&self, quantiles: &Quantiles) -> Option<String> {
        match self {
            Cohort::AboveHighQuantile => Some(format!("Above {}", quantiles.high)),
            Cohort::BelowLowQuantile => Some(format!("Below {}", quantiles.low)),
            Cohort::Middle => None,
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cohort::AboveHighQuantile => "high usage",
            Cohort::BelowLowQuantile => "low usage",
            Cohort::Middle => "middle",
        };
        f.write_str(name)
    }
}
