//! Usage cohort analytics
//!
//! Classifies units by usage rate, aggregates sales per cohort around the
//! recommendation date and projects both cohorts forward to measure how far
//! they drift apart.
//!
//! Every stage is a pure function of its inputs and the [`DashboardConfig`];
//! [`DashboardReport::compute`] chains them.

use serde::{Deserialize, Serialize};

use crate::config::DashboardConfig;
use crate::error::CoreError;
use crate::models::{SalesRecord, UsageRecord};

pub mod charts;
pub mod classifier;
pub mod projection;
pub mod ranking;
pub mod sales;
pub mod stats;
pub mod summary;


pub use charts::{BarPoint, ChartPoint, ChartSeries, DashboardCharts};
pub use classifier::{
    classify, ClassifyParams, HistogramBin, MonthlyUsage, QuantileCutoffs, UnitUsage,
    UsageClassification, UsageDistribution,
};
pub use projection::{
    project, DifferencePoint, ForecastRow, HistoryRow, Projection, ProjectionParams, TrendFit,
};
pub use ranking::{rank_top_units, RankedUnit};
pub use sales::{
    aggregate, CohortPoint, CohortSeries, MonthlyAverage, Phase, SalesAggregation, SalesParams,
    UnitMonthSales,
};
pub use summary::GrossStatistics;

/// Trend projection, or why it could not be made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectionOutcome {
    Ready(Box<Projection>),
    /// A cohort lacks history; the rest of the report still stands
    Unavailable { reason: String },
}

impl ProjectionOutcome {
    /// Create unavailable projection with reason
    pub fn unavailable(reason: &str) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn projection(&self) -> Option<&Projection> {
        match self {
            Self::Ready(projection) => Some(projection),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Complete dashboard for one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardReport {
    pub config: DashboardConfig,
    pub statistics: GrossStatistics,
    pub usage: UsageClassification,
    pub top_units: Vec<RankedUnit>,
    pub sales: SalesAggregation,
    pub projection: ProjectionOutcome,
    pub charts: DashboardCharts,
}

impl DashboardReport {
    /// Run the whole pipeline (sync function)
    ///
    /// classify → aggregate → project → rank → summarize. Deterministic for
    /// equal inputs; nothing depends on the wall clock.
    ///
    /// # Errors
    /// Any stage error except `InsufficientHistory`, which is reported as
    /// [`ProjectionOutcome::Unavailable`].
    pub fn compute(
        config: &DashboardConfig,
        usage_records: &[UsageRecord],
        sales_records: &[SalesRecord],
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let usage = classify(usage_records, &ClassifyParams::from_config(config))?;
        let sales = aggregate(&usage, sales_records, &SalesParams::from_config(config))?;

        let projection = match project(&sales.low, &sales.high, &ProjectionParams::from_config(config)) {
            Ok(projection) => ProjectionOutcome::Ready(Box::new(projection)),
            Err(err @ CoreError::InsufficientHistory { .. }) => {
                tracing::warn!("Projection unavailable: {}", err);
                ProjectionOutcome::unavailable(&err.to_string())
            }
            Err(err) => return Err(err),
        };

        let top_units = rank_top_units(&usage.top_monthly, config.top_n);
        let statistics = GrossStatistics::compute(&usage, &sales, config.rec_date);
        let charts = DashboardCharts::build(
            &usage.distribution,
            &top_units,
            &sales,
            projection.projection(),
        );

        Ok(Self {
            config: config.clone(),
            statistics,
            usage,
            top_units,
            sales,
            projection,
            charts,
        })
    }
}
