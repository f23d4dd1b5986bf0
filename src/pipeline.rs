// 🔗 Pipeline - raw datasets in, analytical tables out
//
// Canonicalizer → Aggregator → MetricComputer, strictly in that order.
// The Forecaster only needs the monthly series, so it runs alongside the
// MetricComputer (rayon::join). A failed forecast is carried in the Report
// and never discards the other tables.

use crate::aggregate::{Aggregation, Aggregator, GroupBy, RawRecord, TOTAL_METRIC};
use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::forecast::Forecast;
use crate::metrics::MetricComputer;
use crate::quality::{QualityEngine, QualityReport};
use crate::region::Canonicalizer;
use crate::tables::{
    lifecycle_summary, monthly_series, state_ranking, update_stress, LifecycleRow, MobilityRow,
    MonthlyRow, StateRankingRow, UpdateBurdenRow, UpdateStressRow,
};
use log::{error, info};
use std::collections::BTreeSet;

/// The three input collections, read-only for the whole run
#[derive(Debug, Clone, Default)]
pub struct Datasets {
    pub enrolment: Vec<RawRecord>,
    pub demographic: Vec<RawRecord>,
    pub biometric: Vec<RawRecord>,
}

/// Every table a run produces
#[derive(Debug, Clone)]
pub struct Report {
    pub lifecycle: Vec<LifecycleRow>,
    pub state_ranking: Vec<StateRankingRow>,
    pub biometric_stress: Vec<UpdateStressRow>,
    pub demographic_stress: Vec<UpdateStressRow>,
    pub monthly: Vec<MonthlyRow>,
    pub update_burden: Vec<UpdateBurdenRow>,
    pub mobility: Vec<MobilityRow>,
    /// `Err` when the forecast stage failed, e.g. on too short a history
    pub forecast: std::result::Result<Forecast, ForecastError>,
    pub quality: QualityReport,
}

pub struct Pipeline {
    canonicalizer: Canonicalizer,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(canonicalizer: Canonicalizer, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline {
            canonicalizer,
            config,
        })
    }

    /// Build the canonicalizer from the config's alias table setting
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let canonicalizer = config.canonicalizer()?;
        Self::new(canonicalizer, config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    pub fn run(&self, datasets: &Datasets) -> Result<Report> {
        info!(
            "Running pipeline: {} enrolment, {} demographic, {} biometric rows",
            datasets.enrolment.len(),
            datasets.demographic.len(),
            datasets.biometric.len()
        );

        // 1. Aggregate
        let aggregator = Aggregator::new(&self.canonicalizer);
        let enrolment_by_region = aggregator.aggregate(&datasets.enrolment, GroupBy::Region);
        let enrolment_by_region_period =
            aggregator.aggregate(&datasets.enrolment, GroupBy::RegionPeriod);
        let enrolment_by_period = aggregator.aggregate(&datasets.enrolment, GroupBy::Period);
        let demographic_by_region = aggregator.aggregate(&datasets.demographic, GroupBy::Region);
        let biometric_by_region = aggregator.aggregate(&datasets.biometric, GroupBy::Region);

        // 2. Metrics and forecast, concurrently
        let update_metric = self.config.update_count.metric();
        let computer = MetricComputer::new(TOTAL_METRIC, update_metric);
        let series: Vec<_> = enrolment_by_period
            .values_by_period(TOTAL_METRIC)
            .into_iter()
            .collect();
        let forecaster = self.config.forecaster();
        let horizon = self.config.horizon;

        let ((burden, mobility), forecast) = rayon::join(
            || {
                let burden = computer.update_burden(
                    &enrolment_by_region.counts,
                    &demographic_by_region.counts,
                    &biometric_by_region.counts,
                );
                let mobility =
                    computer.mobility(&enrolment_by_region.counts, &demographic_by_region.counts);
                (burden, mobility)
            },
            || forecaster.forecast(&series, horizon),
        );
        let (update_burden, mut unmatched) = burden;
        let (mobility, mobility_unmatched) = mobility;
        unmatched.extend(mobility_unmatched);

        // 3. Quality
        let mut quality = self.quality_report(
            &enrolment_by_region_period,
            &demographic_by_region,
            &biometric_by_region,
            unmatched,
        );
        if let Err(e) = &forecast {
            error!("Forecast stage failed, other tables are unaffected: {}", e);
            quality.issues.push(QualityEngine::new().forecast_issue(e));
        }

        let report = Report {
            lifecycle: lifecycle_summary(&datasets.enrolment),
            state_ranking: state_ranking(&enrolment_by_region),
            biometric_stress: update_stress(&biometric_by_region, update_metric),
            demographic_stress: update_stress(&demographic_by_region, update_metric),
            monthly: monthly_series(&enrolment_by_period),
            update_burden,
            mobility,
            forecast,
            quality,
        };

        info!(
            "Pipeline complete: {} regions ranked, {} months, quality: {}",
            report.state_ranking.len(),
            report.monthly.len(),
            report.quality.summary()
        );

        Ok(report)
    }

    fn quality_report(
        &self,
        enrolment: &Aggregation,
        demographic: &Aggregation,
        biometric: &Aggregation,
        unmatched: BTreeSet<String>,
    ) -> QualityReport {
        let engine = QualityEngine::new();
        let named = [
            ("enrolment", enrolment),
            ("demographic", demographic),
            ("biometric", biometric),
        ];

        let datasets = named
            .iter()
            .map(|(name, agg)| engine.dataset_quality(name, agg))
            .collect();
        let conservation = named
            .iter()
            .map(|(name, agg)| engine.check_conservation(name, agg))
            .collect();

        engine.build_report(datasets, conservation, unmatched)
    }
}

// ============================================================================
// TESTS
// ============================================================================
