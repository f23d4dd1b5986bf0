// ⚖️ Metric Computer - cross-dataset join + burden/mobility ratios
//
// Left join keyed on canonical region: every region of the base (enrolment)
// table survives; a region missing from a joined table contributes zero.
// Regions that exist only in a joined table are counted, not joined.
//
//   Update Burden Index = (demographic + biometric) / total_enrolment
//   Mobility Index      =  demographic              / total_enrolment

use crate::aggregate::AggregatedCount;
use crate::tables::{MobilityRow, UpdateBurdenRow};
use log::{debug, info};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ============================================================================
// TYPES
// ============================================================================

/// A ratio per region. `ratio` is `None` when `denominator == 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetric {
    pub region: String,
    pub numerator: f64,
    pub denominator: f64,
    pub ratio: Option<f64>,
    pub rank: usize,
}

/// One base region with its value in each joined table (zero when absent)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRow {
    pub region: String,
    pub base: f64,
    pub joined: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeftJoin {
    /// In base input order
    pub rows: Vec<JoinedRow>,
    /// Regions present in a joined table but not in the base
    pub unmatched_regions: BTreeSet<String>,
}

// ============================================================================
// METRIC COMPUTER
// ============================================================================

pub struct MetricComputer {
    /// Metric read from the base table (enrolment totals)
    pub base_metric: String,
    /// Metric read from every joined table (update volume)
    pub join_metric: String,
}

impl MetricComputer {
    pub fn new(base_metric: impl Into<String>, join_metric: impl Into<String>) -> Self {
        MetricComputer {
            base_metric: base_metric.into(),
            join_metric: join_metric.into(),
        }
    }

    /// Left join on region id. Counts for a region are summed across periods.
    pub fn left_join(&self, base: &[AggregatedCount], joins: &[&[AggregatedCount]]) -> LeftJoin {
        let mut order: Vec<String> = Vec::new();
        let mut base_values: HashMap<String, f64> = HashMap::new();
        for count in base.iter().filter(|c| c.metric == self.base_metric) {
            let Some(region) = &count.region else { continue };
            match base_values.get_mut(region) {
                Some(value) => *value += count.value,
                None => {
                    order.push(region.clone());
                    base_values.insert(region.clone(), count.value);
                }
            }
        }

        let joined_tables: Vec<BTreeMap<String, f64>> = joins
            .iter()
            .map(|table| collapse_by_region(table, &self.join_metric))
            .collect();

        let mut unmatched_regions = BTreeSet::new();
        for table in &joined_tables {
            for region in table.keys() {
                if !base_values.contains_key(region) {
                    unmatched_regions.insert(region.clone());
                }
            }
        }
        if !unmatched_regions.is_empty() {
            debug!(
                "{} joined regions have no enrolment row: {:?}",
                unmatched_regions.len(),
                unmatched_regions
            );
        }

        let rows = order
            .into_iter()
            .map(|region| {
                let joined = joined_tables
                    .iter()
                    .map(|table| table.get(&region).copied().unwrap_or(0.0))
                    .collect();
                JoinedRow {
                    base: base_values.get(&region).copied().unwrap_or(0.0),
                    region,
                    joined,
                }
            })
            .collect();

        LeftJoin {
            rows,
            unmatched_regions,
        }
    }

    /// Numerator = sum over all joined tables, denominator = base value.
    /// Ranked descending by ratio; undefined ratios last; ties keep base order.
    pub fn compute_metrics(
        &self,
        base: &[AggregatedCount],
        joins: &[&[AggregatedCount]],
    ) -> Vec<DerivedMetric> {
        let join = self.left_join(base, joins);
        rank_ratios(
            join.rows
                .into_iter()
                .map(|row| derive(row.region, row.joined.iter().sum(), row.base))
                .collect(),
        )
    }

    /// Update Burden Index table
    pub fn update_burden(
        &self,
        enrolment: &[AggregatedCount],
        demographic: &[AggregatedCount],
        biometric: &[AggregatedCount],
    ) -> (Vec<UpdateBurdenRow>, BTreeSet<String>) {
        let join = self.left_join(enrolment, &[demographic, biometric]);
        let mut parts: HashMap<String, (f64, f64)> = HashMap::new();

        let metrics: Vec<DerivedMetric> = join
            .rows
            .into_iter()
            .map(|row| {
                let (demo, bio) = (row.joined[0], row.joined[1]);
                parts.insert(row.region.clone(), (demo, bio));
                derive(row.region, demo + bio, row.base)
            })
            .collect();

        let rows = rank_ratios(metrics)
            .into_iter()
            .map(|m| {
                let (demo, bio) = parts.get(&m.region).copied().unwrap_or((0.0, 0.0));
                UpdateBurdenRow {
                    region: m.region,
                    demographic_updates: demo,
                    biometric_updates: bio,
                    total_updates: m.numerator,
                    total_enrolment: m.denominator,
                    update_burden_index: m.ratio,
                    rank: m.rank,
                }
            })
            .collect::<Vec<_>>();

        info!("Update Burden Index computed for {} regions", rows.len());
        (rows, join.unmatched_regions)
    }

    /// Mobility Index table
    pub fn mobility(
        &self,
        enrolment: &[AggregatedCount],
        demographic: &[AggregatedCount],
    ) -> (Vec<MobilityRow>, BTreeSet<String>) {
        let join = self.left_join(enrolment, &[demographic]);

        let metrics = join
            .rows
            .into_iter()
            .map(|row| derive(row.region, row.joined[0], row.base))
            .collect();

        let rows = rank_ratios(metrics)
            .into_iter()
            .map(|m| MobilityRow {
                region: m.region,
                demographic_updates: m.numerator,
                total_enrolment: m.denominator,
                mobility_index: m.ratio,
                rank: m.rank,
            })
            .collect::<Vec<_>>();

        info!("Mobility Index computed for {} regions", rows.len());
        (rows, join.unmatched_regions)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn collapse_by_region(counts: &[AggregatedCount], metric: &str) -> BTreeMap<String, f64> {
    let mut values = BTreeMap::new();
    for count in counts.iter().filter(|c| c.metric == metric) {
        if let Some(region) = &count.region {
            *values.entry(region.clone()).or_insert(0.0) += count.value;
        }
    }
    values
}

fn derive(region: String, numerator: f64, denominator: f64) -> DerivedMetric {
    let ratio = if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    };

    DerivedMetric {
        region,
        numerator,
        denominator,
        ratio,
        rank: 0,
    }
}

fn compare_ratio(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable sort by ratio (descending, undefined last), then number 1..=N
fn rank_ratios(mut metrics: Vec<DerivedMetric>) -> Vec<DerivedMetric> {
    metrics.sort_by(|a, b| compare_ratio(a.ratio, b.ratio));
    for (i, metric) in metrics.iter_mut().enumerate() {
        metric.rank = i + 1;
    }
    metrics
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{EVENTS_METRIC, TOTAL_METRIC};

    fn count(region: &str, metric: &str, value: f64) -> AggregatedCount {
        AggregatedCount {
            region: Some(region.to_string()),
            period: None,
            metric: metric.to_string(),
            value,
        }
    }

    fn enrolment(rows: &[(&str, f64)]) -> Vec<AggregatedCount> {
        rows.iter().map(|(r, v)| count(r, TOTAL_METRIC, *v)).collect()
    }

    fn updates(rows: &[(&str, f64)]) -> Vec<AggregatedCount> {
        rows.iter().map(|(r, v)| count(r, EVENTS_METRIC, *v)).collect()
    }

    fn computer() -> MetricComputer {
        MetricComputer::new(TOTAL_METRIC, EVENTS_METRIC)
    }

    #[test]
    fn test_left_join_keeps_every_base_region() {
        let base = enrolment(&[("GOA", 100.0), ("KERALA", 200.0)]);
        let demo = updates(&[("GOA", 10.0), ("LADAKH", 4.0)]);

        let join = computer().left_join(&base, &[&demo]);

        assert_eq!(join.rows.len(), 2);
        assert_eq!(join.rows[1].region, "KERALA");
        assert_eq!(join.rows[1].joined, vec![0.0]);
        assert!(join.unmatched_regions.contains("LADAKH"));
    }

    #[test]
    fn test_zero_enrolment_gives_undefined_mobility_ranked_last() {
        let base = enrolment(&[("EMPTYLAND", 0.0), ("GOA", 100.0), ("KERALA", 50.0)]);
        let demo = updates(&[("EMPTYLAND", 10.0), ("GOA", 10.0), ("KERALA", 10.0)]);

        let (rows, _) = computer().mobility(&base, &demo);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].region, "KERALA");
        assert_eq!(rows[0].mobility_index, Some(0.2));
        assert_eq!(rows[1].region, "GOA");
        assert_eq!(rows[2].region, "EMPTYLAND");
        assert_eq!(rows[2].mobility_index, None);
        assert_eq!(rows[2].rank, 3);
    }

    #[test]
    fn test_update_burden_sums_both_update_tables() {
        let base = enrolment(&[("GOA", 100.0), ("ASSAM", 10.0)]);
        let demo = updates(&[("GOA", 20.0), ("ASSAM", 1.0)]);
        let bio = updates(&[("GOA", 30.0)]);

        let (rows, unmatched) = computer().update_burden(&base, &demo, &bio);

        assert!(unmatched.is_empty());
        assert_eq!(rows[0].region, "GOA");
        assert_eq!(rows[0].demographic_updates, 20.0);
        assert_eq!(rows[0].biometric_updates, 30.0);
        assert_eq!(rows[0].total_updates, 50.0);
        assert_eq!(rows[0].update_burden_index, Some(0.5));
        assert_eq!(rows[1].region, "ASSAM");
        assert_eq!(rows[1].update_burden_index, Some(0.1));
    }

    #[test]
    fn test_ratio_domain_and_rank_permutation() {
        let base = enrolment(&[("A", 0.0), ("B", 3.0), ("C", 7.0), ("D", 0.0), ("E", 2.0)]);
        let demo = updates(&[("B", 1.0), ("C", 7.0), ("E", 0.0)]);
        let bio = updates(&[("A", 2.0), ("B", 2.0)]);

        let metrics = computer().compute_metrics(&base, &[&demo, &bio]);

        assert_eq!(metrics.len(), 5);
        for m in &metrics {
            assert_eq!(m.ratio.is_none(), m.denominator == 0.0);
            if let Some(ratio) = m.ratio {
                assert!(ratio >= 0.0);
            }
        }
        let ranks: Vec<usize> = metrics.iter().map(|m| m.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);

        let defined = metrics.iter().take_while(|m| m.ratio.is_some()).count();
        assert_eq!(defined, 3);
        assert!(metrics[defined..].iter().all(|m| m.ratio.is_none()));
    }

    #[test]
    fn test_equal_ratios_keep_base_order() {
        let base = enrolment(&[("ZETA", 10.0), ("ALPHA", 20.0)]);
        let demo = updates(&[("ZETA", 1.0), ("ALPHA", 2.0)]);

        let metrics = computer().compute_metrics(&base, &[&demo]);

        assert_eq!(metrics[0].region, "ZETA");
        assert_eq!(metrics[1].region, "ALPHA");
    }

    #[test]
    fn test_base_periods_are_summed() {
        let mut base = enrolment(&[("GOA", 40.0)]);
        base.push(count("GOA", TOTAL_METRIC, 60.0));
        let demo = updates(&[("GOA", 10.0)]);

        let metrics = computer().compute_metrics(&base, &[&demo]);

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].denominator, 100.0);
        assert_eq!(metrics[0].ratio, Some(0.1));
    }
}
