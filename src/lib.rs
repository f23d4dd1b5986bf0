// Aadhaar Insights - Core Library
// Region canonicalization, aggregation, derived metrics and forecasting
// over enrolment / demographic-update / biometric-update extracts

pub mod period;
pub mod region;    // Canonicalizer + alias table
pub mod aggregate; // Per-key sums
pub mod metrics;   // Left join + Update Burden / Mobility
pub mod forecast;  // Trend + yearly seasonality
pub mod tables;
pub mod quality;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod io;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use period::{parse_date, parse_period, YearMonth};
pub use region::{
    normalize_label, AliasTable, CanonicalRegion, Canonicalizer, RejectReason, Rejection,
};
pub use aggregate::{
    rank_descending, AggregatedCount, Aggregation, AggregationStats, Aggregator, GroupBy,
    RankedValue, RawRecord, EVENTS_METRIC, TOTAL_METRIC,
};
pub use metrics::{DerivedMetric, JoinedRow, LeftJoin, MetricComputer};
pub use forecast::{Forecast, ForecastModel, ForecastPoint, Forecaster, GapFill};
pub use tables::{
    LifecycleRow, MobilityRow, MonthlyRow, StateRankingRow, UpdateBurdenRow, UpdateStressRow,
};
pub use quality::{
    ConservationCheck, ConservationResult, DatasetQuality, QualityEngine, QualityIssue,
    QualityReport, Severity,
};
pub use config::{PipelineConfig, UpdateCountMode};
pub use error::{AliasTableError, ConfigError, ForecastError, PipelineError, ReservedCategory};
pub use pipeline::{Datasets, Pipeline, Report};
pub use io::{load_dataset, load_datasets, write_report, write_table, DatasetKind};
