// 🚨 Error taxonomy
// Systemic failures only. Per-record conditions (rejected region, unparseable
// date, undefined ratio) are values, see `region::Rejection` and `AggregationStats`.

use crate::period::YearMonth;
use thiserror::Error;

// ============================================================================
// ALIAS TABLE
// ============================================================================

/// A malformed alias table. Fatal at load time, never defaulted.
#[derive(Debug, Error)]
pub enum AliasTableError {
    #[error("failed to read alias table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse alias table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("region id {id:?} is not in normalized form (expected {normalized:?})")]
    NonCanonicalId { id: String, normalized: String },

    #[error("region {region}: alias {alias:?} normalizes to an empty or numeric key")]
    InvalidAlias { region: String, alias: String },

    #[error("alias {alias:?} is claimed by both {first} and {second}")]
    ConflictingAlias {
        alias: String,
        first: String,
        second: String,
    },

    #[error("region id {id} is itself an alias of {target}")]
    ChainedAlias { id: String, target: String },

    #[error("region {0} is declared more than once")]
    DuplicateRegion(String),
}

// ============================================================================
// FORECAST
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForecastError {
    #[error("cannot forecast an empty series")]
    EmptySeries,

    #[error("invalid forecast horizon: {0} (must be at least 1)")]
    InvalidHorizon(usize),

    #[error("invalid confidence level: {0} (must be strictly between 0 and 1)")]
    InvalidConfidence(f64),

    #[error(
        "insufficient history for yearly seasonality: {observed} months observed up to {last_period}, \
         need at least {required}"
    )]
    InsufficientHistory {
        observed: usize,
        required: usize,
        last_period: YearMonth,
    },

    #[error("forecast model error: {0}")]
    Model(String),
}

// ============================================================================
// RECORDS
// ============================================================================

/// A category name that would collide with a derived metric
#[derive(Debug, Error, Clone, PartialEq)]
#[error("category name {0:?} is reserved for a derived metric")]
pub struct ReservedCategory(pub String);

// ============================================================================
// CONFIG + PIPELINE
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
#[error("invalid configuration: {field}: {message}")]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    AliasTable(#[from] AliasTableError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
