// 📊 Output Tables - the interchange contract with persistence/rendering
//
// Field names ARE the column names. Undefined values are `None` and serialize
// as empty cells.

use crate::aggregate::{rank_descending, Aggregation, RawRecord, TOTAL_METRIC};
use crate::period::YearMonth;
use serde::{Deserialize, Serialize};

/// Lifecycle stage label → enrolment category column
pub const LIFECYCLE_STAGES: [(&str, &str); 3] = [
    ("Childhood (0–5)", "age_0_5"),
    ("Adolescence (5–17)", "age_5_17"),
    ("Adulthood (18+)", "age_18_greater"),
];

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleRow {
    pub stage: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRankingRow {
    pub region: String,
    pub total_enrolment: f64,
    pub rank: usize,
}

/// Biometric or demographic update stress, ranked descending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStressRow {
    pub region: String,
    pub update_count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRow {
    pub period: YearMonth,
    pub total: f64,
    /// Percent change from the previous row; `None` for the first row or a zero base
    pub growth_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBurdenRow {
    pub region: String,
    pub demographic_updates: f64,
    pub biometric_updates: f64,
    pub total_updates: f64,
    pub total_enrolment: f64,
    pub update_burden_index: Option<f64>,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobilityRow {
    pub region: String,
    pub demographic_updates: f64,
    pub total_enrolment: f64,
    pub mobility_index: Option<f64>,
    pub rank: usize,
}

// ============================================================================
// BUILDERS
// ============================================================================

/// Three fixed rows, summed over every enrolment row. Not region-keyed, so
/// rejected region labels still count here.
pub fn lifecycle_summary(enrolment: &[RawRecord]) -> Vec<LifecycleRow> {
    LIFECYCLE_STAGES
        .iter()
        .map(|(stage, column)| LifecycleRow {
            stage: stage.to_string(),
            total: enrolment
                .iter()
                .filter_map(|r| r.category_counts().get(*column))
                .sum(),
        })
        .collect()
}

/// Regions ranked by total enrolment, descending, ties by id
pub fn state_ranking(enrolment_by_region: &Aggregation) -> Vec<StateRankingRow> {
    rank_descending(enrolment_by_region.values_by_region(TOTAL_METRIC))
        .into_iter()
        .map(|r| StateRankingRow {
            region: r.region,
            total_enrolment: r.value,
            rank: r.rank,
        })
        .collect()
}

/// Regions ranked by `metric` (update events or category totals), descending
pub fn update_stress(updates_by_region: &Aggregation, metric: &str) -> Vec<UpdateStressRow> {
    rank_descending(updates_by_region.values_by_region(metric))
        .into_iter()
        .map(|r| UpdateStressRow {
            region: r.region,
            update_count: r.value,
        })
        .collect()
}

/// Observed months in order with month-on-month growth
pub fn monthly_series(enrolment_by_period: &Aggregation) -> Vec<MonthlyRow> {
    let mut rows: Vec<MonthlyRow> = Vec::new();
    let mut previous: Option<f64> = None;

    for (period, total) in enrolment_by_period.values_by_period(TOTAL_METRIC) {
        let growth_pct = match previous {
            Some(prev) if prev != 0.0 => Some((total - prev) / prev * 100.0),
            _ => None,
        };
        rows.push(MonthlyRow {
            period,
            total,
            growth_pct,
        });
        previous = Some(total);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Aggregator, GroupBy, EVENTS_METRIC};
    use crate::region::Canonicalizer;
    use chrono::NaiveDate;

    fn enrol(region: &str, ymd: (i32, u32, u32), a: f64, b: f64, c: f64) -> RawRecord {
        RawRecord::new(
            region,
            NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2),
            [("age_0_5", a), ("age_5_17", b), ("age_18_greater", c)],
        )
        .unwrap()
    }

    #[test]
    fn test_lifecycle_has_three_fixed_rows() {
        let records = vec![
            enrol("Goa", (2025, 1, 1), 1.0, 2.0, 3.0),
            enrol("12345", (2025, 1, 1), 10.0, 20.0, 30.0),
        ];

        let rows = lifecycle_summary(&records);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].stage, "Childhood (0–5)");
        assert_eq!(rows[0].total, 11.0);
        assert_eq!(rows[1].total, 22.0);
        assert_eq!(rows[2].total, 33.0);
    }

    #[test]
    fn test_state_ranking_is_permutation_of_regions() {
        let canon = Canonicalizer::bundled().unwrap();
        let records = vec![
            enrol("Goa", (2025, 1, 1), 5.0, 0.0, 0.0),
            enrol("Bihar", (2025, 1, 1), 50.0, 0.0, 0.0),
            enrol("Kerala", (2025, 1, 1), 5.0, 0.0, 0.0),
        ];
        let agg = Aggregator::new(&canon).aggregate(&records, GroupBy::Region);

        let ranking = state_ranking(&agg);

        let regions: Vec<&str> = ranking.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(regions, vec!["BIHAR", "GOA", "KERALA"]);
        assert_eq!(
            ranking.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_update_stress_counts_events() {
        let canon = Canonicalizer::bundled().unwrap();
        let bio = |region: &str| {
            RawRecord::new(region, None, [("bio_age_5_17", 7.0), ("bio_age_17_", 3.0)]).unwrap()
        };
        let records = vec![bio("Goa"), bio("Goa"), bio("Assam")];
        let agg = Aggregator::new(&canon).aggregate(&records, GroupBy::Region);

        let by_events = update_stress(&agg, EVENTS_METRIC);
        assert_eq!(by_events[0].region, "GOA");
        assert_eq!(by_events[0].update_count, 2.0);

        let by_total = update_stress(&agg, TOTAL_METRIC);
        assert_eq!(by_total[0].update_count, 20.0);
    }

    #[test]
    fn test_monthly_growth() {
        let canon = Canonicalizer::bundled().unwrap();
        let records = vec![
            enrol("Goa", (2025, 1, 10), 100.0, 0.0, 0.0),
            enrol("Goa", (2025, 2, 10), 150.0, 0.0, 0.0),
            enrol("Goa", (2025, 3, 10), 0.0, 0.0, 0.0),
            enrol("Goa", (2025, 4, 10), 10.0, 0.0, 0.0),
        ];
        let agg = Aggregator::new(&canon).aggregate(&records, GroupBy::Period);

        let rows = monthly_series(&agg);

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].period.to_string(), "2025-01");
        assert_eq!(rows[0].growth_pct, None);
        assert_eq!(rows[1].growth_pct, Some(50.0));
        assert_eq!(rows[2].growth_pct, Some(-100.0));
        assert_eq!(rows[3].growth_pct, None);
    }
}
