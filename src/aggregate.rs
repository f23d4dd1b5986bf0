// 🧮 Aggregator - per-key reduction of raw event rows
//
// Reduction is a plain sum per (region, period, metric) group, so it is
// computed as rayon fold (per-partition partial sums) + reduce (merge).
// Group iteration order never affects the result.

use crate::error::ReservedCategory;
use crate::period::YearMonth;
use crate::region::Canonicalizer;
use chrono::NaiveDate;
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Sum of a row's category counts. Reserved: no category may use this name.
pub const TOTAL_METRIC: &str = "total";

/// Number of rows in the group. Reserved: no category may use this name.
pub const EVENTS_METRIC: &str = "events";

// ============================================================================
// RAW RECORD
// ============================================================================

/// One event row as handed over by ingestion. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRecord {
    pub region_raw: String,
    pub date: Option<NaiveDate>,
    category_counts: BTreeMap<String, f64>,
}

impl RawRecord {
    /// Fails if a category is named `total` or `events`, which would collide
    /// with the derived metrics in every aggregation.
    pub fn new<K, I>(
        region_raw: impl Into<String>,
        date: Option<NaiveDate>,
        counts: I,
    ) -> Result<Self, ReservedCategory>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut category_counts = BTreeMap::new();
        for (category, count) in counts {
            let category = category.into();
            if category == TOTAL_METRIC || category == EVENTS_METRIC {
                return Err(ReservedCategory(category));
            }
            category_counts.insert(category, count);
        }

        Ok(RawRecord {
            region_raw: region_raw.into(),
            date,
            category_counts,
        })
    }

    pub fn category_counts(&self) -> &BTreeMap<String, f64> {
        &self.category_counts
    }

    /// Per-row total (sum of category counts)
    pub fn total(&self) -> f64 {
        self.category_counts.values().sum()
    }

    pub fn period(&self) -> Option<YearMonth> {
        self.date.map(YearMonth::from_date)
    }
}

// ============================================================================
// GROUPING
// ============================================================================

/// Grouping key chosen per report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// Region only: rows with unparseable dates still count
    Region,
    /// Region × month: needs both a canonical region and a parseable date
    RegionPeriod,
    /// Month only: region rejection does not apply
    Period,
}

impl GroupBy {
    fn keys_region(&self) -> bool {
        matches!(self, GroupBy::Region | GroupBy::RegionPeriod)
    }

    fn keys_period(&self) -> bool {
        matches!(self, GroupBy::RegionPeriod | GroupBy::Period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct GroupKey {
    region: Option<String>,
    period: Option<YearMonth>,
}

/// One row per (region, period, metric). `region`/`period` are `None` when
/// not part of the grouping key. Values are non-negative sums.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedCount {
    pub region: Option<String>,
    pub period: Option<YearMonth>,
    pub metric: String,
    pub value: f64,
}

// ============================================================================
// STATS
// ============================================================================

/// Per-record exclusions, counted and absorbed (never fatal)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregationStats {
    pub rows_in: usize,
    pub rows_aggregated: usize,
    /// Rows dropped because their region label was rejected
    pub rejected_region: usize,
    /// Rows dropped from a period-keyed grouping because the date did not parse
    pub unparseable_date: usize,
    /// Raw label → number of rejected rows carrying it
    pub rejected_labels: BTreeMap<String, usize>,
    /// Sum of row totals over all input rows
    pub raw_total: f64,
    /// Sum of row totals over dropped rows
    pub excluded_total: f64,
}

impl AggregationStats {
    fn merge(mut self, other: AggregationStats) -> Self {
        self.rows_in += other.rows_in;
        self.rows_aggregated += other.rows_aggregated;
        self.rejected_region += other.rejected_region;
        self.unparseable_date += other.unparseable_date;
        self.raw_total += other.raw_total;
        self.excluded_total += other.excluded_total;
        for (label, count) in other.rejected_labels {
            *self.rejected_labels.entry(label).or_insert(0) += count;
        }
        self
    }
}

// ============================================================================
// PARTIAL SUMS
// ============================================================================

#[derive(Debug, Default)]
struct PartialSums {
    groups: HashMap<GroupKey, BTreeMap<String, f64>>,
    stats: AggregationStats,
}

impl PartialSums {
    fn add(mut self, record: &RawRecord, canonicalizer: &Canonicalizer, group_by: GroupBy) -> Self {
        let row_total = record.total();
        self.stats.rows_in += 1;
        self.stats.raw_total += row_total;

        let region = if group_by.keys_region() {
            match canonicalizer.canonicalize(&record.region_raw) {
                Ok(id) => Some(id),
                Err(rejection) => {
                    self.stats.rejected_region += 1;
                    self.stats.excluded_total += row_total;
                    *self.stats.rejected_labels.entry(rejection.raw).or_insert(0) += 1;
                    return self;
                }
            }
        } else {
            None
        };

        let period = if group_by.keys_period() {
            match record.period() {
                Some(period) => Some(period),
                None => {
                    self.stats.unparseable_date += 1;
                    self.stats.excluded_total += row_total;
                    return self;
                }
            }
        } else {
            None
        };

        let metrics = self.groups.entry(GroupKey { region, period }).or_default();
        for (category, count) in &record.category_counts {
            *metrics.entry(category.clone()).or_insert(0.0) += count;
        }
        *metrics.entry(TOTAL_METRIC.to_string()).or_insert(0.0) += row_total;
        *metrics.entry(EVENTS_METRIC.to_string()).or_insert(0.0) += 1.0;

        self.stats.rows_aggregated += 1;
        self
    }

    fn merge(mut self, other: PartialSums) -> Self {
        for (key, metrics) in other.groups {
            let target = self.groups.entry(key).or_default();
            for (metric, value) in metrics {
                *target.entry(metric).or_insert(0.0) += value;
            }
        }
        self.stats = self.stats.merge(other.stats);
        self
    }
}

// ============================================================================
// AGGREGATION RESULT
// ============================================================================

/// Count table plus the exclusions that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub group_by_region: bool,
    pub group_by_period: bool,
    /// Sorted by (region, period, metric)
    pub counts: Vec<AggregatedCount>,
    pub stats: AggregationStats,
}

impl Aggregation {
    pub fn metric<'a>(&'a self, metric: &'a str) -> impl Iterator<Item = &'a AggregatedCount> + 'a {
        self.counts.iter().filter(move |c| c.metric == metric)
    }

    /// Metric summed per region (over periods, if any)
    pub fn values_by_region(&self, metric: &str) -> BTreeMap<String, f64> {
        let mut values = BTreeMap::new();
        for count in self.metric(metric) {
            if let Some(region) = &count.region {
                *values.entry(region.clone()).or_insert(0.0) += count.value;
            }
        }
        values
    }

    /// Metric summed per period (over regions, if any)
    pub fn values_by_period(&self, metric: &str) -> BTreeMap<YearMonth, f64> {
        let mut values = BTreeMap::new();
        for count in self.metric(metric) {
            if let Some(period) = count.period {
                *values.entry(period).or_insert(0.0) += count.value;
            }
        }
        values
    }

    /// Grand total of a metric across all groups
    pub fn total(&self, metric: &str) -> f64 {
        self.metric(metric).map(|c| c.value).sum()
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct Aggregator<'a> {
    canonicalizer: &'a Canonicalizer,
}

impl<'a> Aggregator<'a> {
    pub fn new(canonicalizer: &'a Canonicalizer) -> Self {
        Aggregator { canonicalizer }
    }

    /// Group and sum `records`. Missing (region, period) combinations are
    /// implicitly zero and never materialized.
    pub fn aggregate(&self, records: &[RawRecord], group_by: GroupBy) -> Aggregation {
        let canonicalizer = self.canonicalizer;

        let sums = records
            .par_iter()
            .fold(PartialSums::default, |acc, record| {
                acc.add(record, canonicalizer, group_by)
            })
            .reduce(PartialSums::default, PartialSums::merge);

        let mut counts: Vec<AggregatedCount> = Vec::new();
        let mut groups: Vec<(GroupKey, BTreeMap<String, f64>)> = sums.groups.into_iter().collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, metrics) in groups {
            for (metric, value) in metrics {
                counts.push(AggregatedCount {
                    region: key.region.clone(),
                    period: key.period,
                    metric,
                    value,
                });
            }
        }

        let stats = sums.stats;
        if stats.rejected_region > 0 {
            warn!(
                "{} rows dropped: region label rejected ({} distinct labels)",
                stats.rejected_region,
                stats.rejected_labels.len()
            );
        }
        if stats.unparseable_date > 0 {
            warn!("{} rows dropped: unparseable date", stats.unparseable_date);
        }
        info!(
            "Aggregated {} of {} rows into {} count rows ({:?})",
            stats.rows_aggregated,
            stats.rows_in,
            counts.len(),
            group_by
        );

        Aggregation {
            group_by_region: group_by.keys_region(),
            group_by_period: group_by.keys_period(),
            counts,
            stats,
        }
    }
}

// ============================================================================
// RANKING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedValue {
    pub region: String,
    pub value: f64,
    pub rank: usize,
}

/// Rank regions by value descending, ties by canonical id ascending. Ranks are 1..=N.
pub fn rank_descending<I>(values: I) -> Vec<RankedValue>
where
    I: IntoIterator<Item = (String, f64)>,
{
    let mut rows: Vec<(String, f64)> = values.into_iter().collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    rows.into_iter()
        .enumerate()
        .map(|(i, (region, value))| RankedValue {
            region,
            value,
            rank: i + 1,
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
