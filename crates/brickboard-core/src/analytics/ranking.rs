//! Top-N ranking of high usage units

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::classifier::MonthlyUsage;

/// One row of the top-N table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedUnit {
    /// 1-based position
    pub rank: usize,
    pub unit: String,
    pub usage_events: u64,
    pub opportunities: u64,
    pub usage_rate: f64,
    /// Months the unit appears in
    pub months: usize,
}

/// Rank units by their rate over all months, highest first
///
/// Ties are broken by unit key so the ranking is stable across runs.
pub fn rank_top_units(monthly: &[MonthlyUsage], n: usize) -> Vec<RankedUnit> {
    if n == 0 {
        return Vec::new();
    }

    let mut per_unit: BTreeMap<&str, (u64, u64, usize)> = BTreeMap::new();
    for row in monthly {
        let entry = per_unit.entry(row.unit.as_str()).or_default();
        entry.0 += row.usage_events;
        entry.1 += row.opportunities;
        entry.2 += 1;
    }

    let mut ranked: Vec<RankedUnit> = per_unit
        .into_iter()
        .map(|(unit, (events, opportunities, months))| RankedUnit {
            rank: 0,
            unit: unit.to_string(),
            usage_events: events,
            opportunities,
            usage_rate: if opportunities == 0 {
                0.0
            } else {
                events as f64 / opportunities as f64
            },
            months,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.usage_rate
            .total_cmp(&a.usage_rate)
            .then_with(|| a.unit.cmp(&b.unit))
    });
    ranked.truncate(n);
    for (i, unit) in ranked.iter_mut().enumerate() {
        unit.rank = i + 1;
    }
    ranked
}
