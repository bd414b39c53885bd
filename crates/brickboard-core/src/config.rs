//! Dashboard configuration
//!
//! Brand, level and sales line used to fan out into many loosely related
//! parameters. They are now resolved once into an immutable
//! [`DashboardConfig`] that every pipeline stage receives explicitly.
//!
//! Resolution order (later wins): built-in defaults, TOML config file,
//! command-line / environment overrides. Each source is a [`ConfigLayer`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;
use crate::models::parse_date;

/// Default base location of the `{brand}_{dataset}.csv` files
pub const DEFAULT_DATA_LOCATION: &str = "https://storage.googleapis.com/sales_az";

/// Loaded datasets are reused for one hour
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60;

/// Longest projection past the last history month, ten years
pub const MAX_FORECAST_HORIZON: usize = 120;

/// Product brand under analysis; selects dataset identity and product name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Brand {
    Trixeo,
    Forxiga,
}

impl Brand {
    pub fn slug(&self) -> &'static str {
        match self {
            Brand::Trixeo => "trixeo",
            Brand::Forxiga => "forxiga",
        }
    }

    /// Product name as it appears in the sales dataset
    pub fn product_name(&self) -> &'static str {
        match self {
            Brand::Trixeo => "TRIXEO + IMP.",
            Brand::Forxiga => "FORXIGA + IMP.",
        }
    }
}

impl FromStr for Brand {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trixeo" => Ok(Brand::Trixeo),
            "forxiga" => Ok(Brand::Forxiga),
            other => Err(invalid(format!("unknown brand '{}' (expected trixeo|forxiga)", other))),
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Unit granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Fine territory unit
    MiniBrick,
    /// Coarse territory unit, groups several mini-bricks
    Brick,
}

impl Level {
    pub fn slug(&self) -> &'static str {
        match self {
            Level::MiniBrick => "mini_brick",
            Level::Brick => "brick",
        }
    }

    pub fn is_finer_than(&self, other: Level) -> bool {
        matches!((self, other), (Level::MiniBrick, Level::Brick))
    }
}

impl FromStr for Level {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "mini_brick" => Ok(Level::MiniBrick),
            "brick" => Ok(Level::Brick),
            other => Err(invalid(format!("unknown level '{}' (expected mini_brick|brick)", other))),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Sales line; selects the business unit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SalesLine {
    #[serde(rename = "AZ")]
    Az,
    #[serde(rename = "Santis")]
    Santis,
}

impl SalesLine {
    pub fn business_unit(&self) -> &'static str {
        match self {
            SalesLine::Az => "AZ_RESPI_INH",
            SalesLine::Santis => "SAN_MIX",
        }
    }
}

impl FromStr for SalesLine {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "az" => Ok(SalesLine::Az),
            "santis" => Ok(SalesLine::Santis),
            other => Err(invalid(format!("unknown sales line '{}' (expected AZ|Santis)", other))),
        }
    }
}

impl fmt::Display for SalesLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SalesLine::Az => f.write_str("AZ"),
            SalesLine::Santis => f.write_str("Santis"),
        }
    }
}

/// Low/high quantile pair, `0 <= low < high <= 1`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantiles {
    pub low: f64,
    pub high: f64,
}

impl Quantiles {
    pub fn new(low: f64, high: f64) -> Result<Self, CoreError> {
        let quantiles = Self { low, high };
        quantiles.validate()?;
        Ok(quantiles)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let in_range = |q: f64| (0.0..=1.0).contains(&q);
        if !in_range(self.low) || !in_range(self.high) {
            return Err(invalid(format!(
                "quantiles must lie in [0, 1] (got {} and {})",
                self.low, self.high
            )));
        }
        if self.low >= self.high {
            return Err(invalid(format!(
                "low quantile {} must be below high quantile {}",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

impl Default for Quantiles {
    fn default() -> Self {
        Self { low: 0.20, high: 0.80 }
    }
}

/// Immutable parameters for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub brand: Brand,
    /// Granularity of usage classification
    pub level: Level,
    /// Granularity of the sales join; equal to `level` or coarser
    pub sales_level: Level,
    pub sales_line: SalesLine,
    pub quantiles: Quantiles,
    /// Units with fewer usage events are reported with a clipped rate of 0
    pub usage_threshold: u32,
    /// Divergence flag fires when the projected cohort gap exceeds this
    pub reg_threshold: f64,
    /// Only suggestions of this content type count as usage events
    pub content_type: Option<String>,
    /// Months on/before this date are history, later months are forecast
    pub rec_date: NaiveDate,
    /// Rolling mean window in months
    pub window: usize,
    /// Size of the top-N ranking
    pub top_n: usize,
    /// Months projected past the last history month
    pub forecast_horizon: usize,
    /// Bins of the usage-rate distribution
    pub histogram_bins: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            brand: Brand::Trixeo,
            level: Level::MiniBrick,
            sales_level: Level::MiniBrick,
            sales_line: SalesLine::Az,
            quantiles: Quantiles::default(),
            usage_threshold: 0,
            reg_threshold: 3.0,
            content_type: None,
            rec_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default(),
            window: 3,
            top_n: 10,
            forecast_horizon: 6,
            histogram_bins: 20,
        }
    }
}

impl DashboardConfig {
    /// Check every parameter; pipeline stages assume a validated config
    pub fn validate(&self) -> Result<(), CoreError> {
        self.quantiles.validate()?;

        if self.window < 1 {
            return Err(CoreError::InvalidWindow {
                window: self.window,
            });
        }
        if !self.reg_threshold.is_finite() || self.reg_threshold < 0.0 {
            return Err(invalid(format!(
                "reg_threshold must be a non-negative number (got {})",
                self.reg_threshold
            )));
        }
        if self.forecast_horizon > MAX_FORECAST_HORIZON {
            return Err(invalid(format!(
                "forecast_horizon must be at most {} months (got {})",
                MAX_FORECAST_HORIZON, self.forecast_horizon
            )));
        }
        if self.histogram_bins == 0 {
            return Err(invalid("histogram_bins must be at least 1"));
        }
        if self.sales_level.is_finer_than(self.level) {
            return Err(invalid(format!(
                "sales level {} is finer than usage level {}; cohorts cannot be split",
                self.sales_level, self.level
            )));
        }
        Ok(())
    }

    pub fn business_unit(&self) -> &'static str {
        self.sales_line.business_unit()
    }

    pub fn product_name(&self) -> &'static str {
        self.brand.product_name()
    }
}

/// Where datasets come from and how long they stay cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Local directory or `http(s)://` base URL
    pub location: String,
    pub cache_ttl: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            location: DEFAULT_DATA_LOCATION.to_string(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

/// One partial source of configuration (file, CLI, env)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub brand: Option<Brand>,
    pub level: Option<Level>,
    pub sales_level: Option<Level>,
    pub sales_line: Option<SalesLine>,
    pub quantile_low: Option<f64>,
    pub quantile_high: Option<f64>,
    pub usage_threshold: Option<u32>,
    pub reg_threshold: Option<f64>,
    pub content_type: Option<String>,
    /// Quoted date string; accepts the same formats as the datasets
    pub rec_date: Option<String>,
    pub window: Option<usize>,
    pub top_n: Option<usize>,
    pub forecast_horizon: Option<usize>,
    pub histogram_bins: Option<usize>,
    pub data_location: Option<String>,
    pub cache_ttl_secs: Option<u64>,
}

impl ConfigLayer {
    /// Load a TOML layer from disk
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`ConfigLayer::load`] but a missing file yields an empty layer
    pub fn load_optional(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Overlay `other` on top of `self`; values set in `other` win
    pub fn merge(self, other: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            brand: other.brand.or(self.brand),
            level: other.level.or(self.level),
            sales_level: other.sales_level.or(self.sales_level),
            sales_line: other.sales_line.or(self.sales_line),
            quantile_low: other.quantile_low.or(self.quantile_low),
            quantile_high: other.quantile_high.or(self.quantile_high),
            usage_threshold: other.usage_threshold.or(self.usage_threshold),
            reg_threshold: other.reg_threshold.or(self.reg_threshold),
            content_type: other.content_type.or(self.content_type),
            rec_date: other.rec_date.or(self.rec_date),
            window: other.window.or(self.window),
            top_n: other.top_n.or(self.top_n),
            forecast_horizon: other.forecast_horizon.or(self.forecast_horizon),
            histogram_bins: other.histogram_bins.or(self.histogram_bins),
            data_location: other.data_location.or(self.data_location),
            cache_ttl_secs: other.cache_ttl_secs.or(self.cache_ttl_secs),
        }
    }

    /// Fill gaps with defaults and validate
    pub fn resolve(self) -> Result<(DashboardConfig, SourceConfig), CoreError> {
        let defaults = DashboardConfig::default();
        let level = self.level.unwrap_or(defaults.level);

        let rec_date = match self.rec_date.as_deref() {
            Some(raw) => parse_date(raw)
                .ok_or_else(|| invalid(format!("cannot parse rec_date '{}'", raw)))?,
            None => defaults.rec_date,
        };

        // "none"/"all" disable the content filter explicitly
        let content_type = self
            .content_type
            .filter(|ct| !ct.is_empty() && !matches!(ct.to_ascii_lowercase().as_str(), "none" | "all"));

        let config = DashboardConfig {
            brand: self.brand.unwrap_or(defaults.brand),
            level,
            sales_level: self.sales_level.unwrap_or(level),
            sales_line: self.sales_line.unwrap_or(defaults.sales_line),
            quantiles: Quantiles {
                low: self.quantile_low.unwrap_or(defaults.quantiles.low),
                high: self.quantile_high.unwrap_or(defaults.quantiles.high),
            },
            usage_threshold: self.usage_threshold.unwrap_or(defaults.usage_threshold),
            reg_threshold: self.reg_threshold.unwrap_or(defaults.reg_threshold),
            content_type,
            rec_date,
            window: self.window.unwrap_or(defaults.window),
            top_n: self.top_n.unwrap_or(defaults.top_n),
            forecast_horizon: self.forecast_horizon.unwrap_or(defaults.forecast_horizon),
            histogram_bins: self.histogram_bins.unwrap_or(defaults.histogram_bins),
        };
        config.validate()?;

        let source_defaults = SourceConfig::default();
        let source = SourceConfig {
            location: self.data_location.unwrap_or(source_defaults.location),
            cache_ttl: self
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(source_defaults.cache_ttl),
        };

        Ok((config, source))
    }
}

impl From<&DashboardConfig> for ConfigLayer {
    fn from(config: &DashboardConfig) -> Self {
        ConfigLayer {
            brand: Some(config.brand),
            level: Some(config.level),
            sales_level: Some(config.sales_level),
            sales_line: Some(config.sales_line),
            quantile_low: Some(config.quantiles.low),
            quantile_high: Some(config.quantiles.high),
            usage_threshold: Some(config.usage_threshold),
            reg_threshold: Some(config.reg_threshold),
            content_type: config.content_type.clone(),
            rec_date: Some(config.rec_date.format("%Y-%m-%d").to_string()),
            window: Some(config.window),
            top_n: Some(config.top_n),
            forecast_horizon: Some(config.forecast_horizon),
            histogram_bins: Some(config.histogram_bins),
            data_location: None,
            cache_ttl_secs: None,
        }
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidConfig {
        message: message.into(),
    }
}
