// ✅ Data Quality - what was dropped, and do the totals still add up
//
// Per-record conditions never abort the run; they end up here instead.
// Conservation check (same shape as a balance reconciliation):
//   raw_total = aggregated_total + excluded_total

use crate::aggregate::{Aggregation, TOTAL_METRIC};
use crate::error::ForecastError;
use log::warn;
use serde::Serialize;
use std::collections::BTreeSet;

/// Rejection share above which the alias table probably needs attention
const REJECTION_WARNING_RATE: f64 = 0.05;

// ============================================================================
// REPORT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Severity {
    Critical, // Totals do not reconcile
    Warning,  // Many rows dropped
    Info,     // Some rows dropped
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub dataset: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetQuality {
    pub dataset: String,
    pub rows: usize,
    pub rejected_region: usize,
    pub unparseable_date: usize,
    /// Most frequent rejected raw labels, most frequent first
    pub top_rejected_labels: Vec<(String, usize)>,
}

impl DatasetQuality {
    pub fn rejection_rate(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.rejected_region as f64 / self.rows as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConservationResult {
    Balanced {
        raw_total: f64,
        aggregated_total: f64,
        excluded_total: f64,
    },
    Discrepancy {
        expected: f64,
        actual: f64,
        difference: f64,
    },
}

impl ConservationResult {
    pub fn is_balanced(&self) -> bool {
        matches!(self, ConservationResult::Balanced { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConservationCheck {
    pub dataset: String,
    pub result: ConservationResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub datasets: Vec<DatasetQuality>,
    pub conservation: Vec<ConservationCheck>,
    /// Regions seen in update datasets with no enrolment row
    pub unmatched_join_regions: BTreeSet<String>,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn summary(&self) -> String {
        let rows: usize = self.datasets.iter().map(|d| d.rows).sum();
        let rejected: usize = self.datasets.iter().map(|d| d.rejected_region).sum();
        let unparseable: usize = self.datasets.iter().map(|d| d.unparseable_date).sum();

        format!(
            "Rows: {}, rejected regions: {}, unparseable dates: {}, unmatched join regions: {}, issues: {} ({} critical)",
            rows,
            rejected,
            unparseable,
            self.unmatched_join_regions.len(),
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == Severity::Critical)
                .count()
        )
    }

    pub fn has_critical_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    pub fn is_balanced(&self) -> bool {
        self.conservation.iter().all(|c| c.result.is_balanced())
    }
}

// ============================================================================
// QUALITY ENGINE
// ============================================================================

pub struct QualityEngine {
    /// Tolerance for floating-point comparison of totals
    pub tolerance: f64,

    /// How many rejected labels to keep per dataset
    pub max_labels: usize,
}

impl QualityEngine {
    pub fn new() -> Self {
        QualityEngine {
            tolerance: 1e-6,
            max_labels: 10,
        }
    }

    pub fn dataset_quality(&self, dataset: &str, aggregation: &Aggregation) -> DatasetQuality {
        let mut labels: Vec<(String, usize)> = aggregation
            .stats
            .rejected_labels
            .iter()
            .map(|(label, count)| (label.clone(), *count))
            .collect();
        labels.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        labels.truncate(self.max_labels);

        DatasetQuality {
            dataset: dataset.to_string(),
            rows: aggregation.stats.rows_in,
            rejected_region: aggregation.stats.rejected_region,
            unparseable_date: aggregation.stats.unparseable_date,
            top_rejected_labels: labels,
        }
    }

    /// Aggregated total plus excluded rows must give back the raw total
    pub fn check_conservation(&self, dataset: &str, aggregation: &Aggregation) -> ConservationCheck {
        let raw_total = aggregation.stats.raw_total;
        let aggregated_total = aggregation.total(TOTAL_METRIC);
        let excluded_total = aggregation.stats.excluded_total;
        let actual = aggregated_total + excluded_total;
        let difference = (raw_total - actual).abs();

        let result = if difference <= self.tolerance * raw_total.abs().max(1.0) {
            ConservationResult::Balanced {
                raw_total,
                aggregated_total,
                excluded_total,
            }
        } else {
            warn!(
                "{}: totals do not reconcile (raw {}, aggregated + excluded {})",
                dataset, raw_total, actual
            );
            ConservationResult::Discrepancy {
                expected: raw_total,
                actual,
                difference,
            }
        };

        ConservationCheck {
            dataset: dataset.to_string(),
            result,
        }
    }

    pub fn build_report(
        &self,
        datasets: Vec<DatasetQuality>,
        conservation: Vec<ConservationCheck>,
        unmatched_join_regions: BTreeSet<String>,
    ) -> QualityReport {
        let mut issues = Vec::new();

        for d in &datasets {
            if d.rejected_region > 0 {
                let severity = if d.rejection_rate() > REJECTION_WARNING_RATE {
                    Severity::Warning
                } else {
                    Severity::Info
                };
                issues.push(QualityIssue {
                    severity,
                    dataset: d.dataset.clone(),
                    issue: format!(
                        "{} of {} rows have an empty or numeric region label",
                        d.rejected_region, d.rows
                    ),
                    recommendation: "Check the source extract for shifted columns".to_string(),
                });
            }

            if d.unparseable_date > 0 {
                issues.push(QualityIssue {
                    severity: Severity::Info,
                    dataset: d.dataset.clone(),
                    issue: format!("{} rows have an unparseable date", d.unparseable_date),
                    recommendation: "Dates are expected day-first (DD-MM-YYYY)".to_string(),
                });
            }
        }

        for check in &conservation {
            if let ConservationResult::Discrepancy { difference, .. } = check.result {
                issues.push(QualityIssue {
                    severity: Severity::Critical,
                    dataset: check.dataset.clone(),
                    issue: format!("Totals off by {}", difference),
                    recommendation: "Aggregation lost or duplicated rows".to_string(),
                });
            }
        }

        if !unmatched_join_regions.is_empty() {
            issues.push(QualityIssue {
                severity: Severity::Info,
                dataset: "updates".to_string(),
                issue: format!(
                    "{} update regions have no enrolment row",
                    unmatched_join_regions.len()
                ),
                recommendation: "Add missing spellings to the region alias table".to_string(),
            });
        }

        QualityReport {
            datasets,
            conservation,
            unmatched_join_regions,
            issues,
        }
    }

    /// A forecast that could not be produced. The other tables still stand.
    pub fn forecast_issue(&self, error: &ForecastError) -> QualityIssue {
        let recommendation = match error {
            ForecastError::InsufficientHistory { .. } => {
                "Supply more months of enrolment, or opt in to the trend-only fallback"
            }
            ForecastError::EmptySeries => "No enrolment row carried a parseable date",
            _ => "Check the monthly enrolment series and the forecast settings",
        };

        QualityIssue {
            severity: Severity::Critical,
            dataset: "forecast".to_string(),
            issue: format!("Forecast not produced: {}", error),
            recommendation: recommendation.to_string(),
        }
    }
}

impl Default for QualityEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
