// ⚙️ Pipeline Configuration - rules as data
// Every field has a default; a JSON file overrides any subset of them.

use crate::aggregate::{EVENTS_METRIC, TOTAL_METRIC};
use crate::error::{AliasTableError, ConfigError};
use crate::forecast::{
    Forecaster, GapFill, DEFAULT_CONFIDENCE_LEVEL, DEFAULT_HORIZON, MIN_SEASONAL_PERIODS,
};
use crate::region::{AliasTable, Canonicalizer};
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What an "update" volume means for the demographic/biometric datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateCountMode {
    /// One per update row
    #[default]
    Events,
    /// Sum of the row's age-band counts
    CategoryTotal,
}

impl UpdateCountMode {
    /// Aggregated metric holding the update volume
    pub fn metric(&self) -> &'static str {
        match self {
            UpdateCountMode::Events => EVENTS_METRIC,
            UpdateCountMode::CategoryTotal => TOTAL_METRIC,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Months to forecast past the last observed month
    pub horizon: usize,

    /// Coverage of the forecast band, strictly between 0 and 1
    pub confidence_level: f64,

    /// Observed months required before yearly seasonality is fitted
    pub min_seasonal_periods: usize,

    /// Degrade to a trend-only forecast instead of failing on short history
    pub allow_trend_only: bool,

    pub gap_fill: GapFill,

    pub update_count: UpdateCountMode,

    /// Rows shown in CLI summaries
    pub top_n: usize,

    /// External alias table; the bundled one is used when absent
    pub alias_table: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            horizon: DEFAULT_HORIZON,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            min_seasonal_periods: MIN_SEASONAL_PERIODS,
            allow_trend_only: false,
            gap_fill: GapFill::Zero,
            update_count: UpdateCountMode::Events,
            top_n: 5,
            alias_table: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: PipelineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon == 0 {
            return Err(ConfigError {
                field: "horizon",
                message: "must be at least 1".to_string(),
            });
        }

        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ConfigError {
                field: "confidence_level",
                message: format!("must be strictly between 0 and 1, got {}", self.confidence_level),
            });
        }

        if self.min_seasonal_periods < MIN_SEASONAL_PERIODS {
            return Err(ConfigError {
                field: "min_seasonal_periods",
                message: format!(
                    "must be at least {} (two full years), got {}",
                    MIN_SEASONAL_PERIODS, self.min_seasonal_periods
                ),
            });
        }

        Ok(())
    }

    /// Canonicalizer over the configured (or bundled) alias table
    pub fn canonicalizer(&self) -> Result<Canonicalizer, AliasTableError> {
        let table = match &self.alias_table {
            Some(path) => AliasTable::from_file(path)?,
            None => AliasTable::bundled()?,
        };
        Ok(Canonicalizer::new(table))
    }

    pub fn forecaster(&self) -> Forecaster {
        Forecaster::new()
            .with_confidence(self.confidence_level)
            .with_min_seasonal_periods(self.min_seasonal_periods)
            .with_trend_only_fallback(self.allow_trend_only)
            .with_gap_fill(self.gap_fill)
    }
}

// ============================================================================
// TESTS
// ============================================================================
