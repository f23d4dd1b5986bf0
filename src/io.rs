// 📂 CSV Boundary - dataset directories in, table files out
//
// Each dataset is a directory of CSV extracts that share a schema. Files are
// read in name order and concatenated; exact duplicate rows are dropped using
// a SHA-256 fingerprint of the row.

use crate::aggregate::RawRecord;
use crate::forecast::{Forecast, ForecastModel, ForecastPoint};
use crate::period::{parse_date, YearMonth};
use crate::pipeline::{Datasets, Report};
use crate::quality::QualityReport;
use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const REGION_COLUMN: &str = "state";
pub const DATE_COLUMN: &str = "date";

// ============================================================================
// DATASET SCHEMAS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Enrolment,
    Demographic,
    Biometric,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [
        DatasetKind::Enrolment,
        DatasetKind::Demographic,
        DatasetKind::Biometric,
    ];

    /// Directory under the data dir holding this dataset's CSV files
    pub fn dir_name(&self) -> &'static str {
        match self {
            DatasetKind::Enrolment => "enrolment",
            DatasetKind::Demographic => "demographic",
            DatasetKind::Biometric => "biometric",
        }
    }

    pub fn category_columns(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Enrolment => &["age_0_5", "age_5_17", "age_18_greater"],
            DatasetKind::Demographic => &["demo_age_5_17", "demo_age_17_"],
            DatasetKind::Biometric => &["bio_age_5_17", "bio_age_17_"],
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load all three datasets from `<data_dir>/{enrolment,demographic,biometric}/`
pub fn load_datasets(data_dir: &Path) -> Result<Datasets> {
    let mut datasets = Datasets::default();

    for kind in DatasetKind::ALL {
        let records = load_dataset(&data_dir.join(kind.dir_name()), kind)?;
        match kind {
            DatasetKind::Enrolment => datasets.enrolment = records,
            DatasetKind::Demographic => datasets.demographic = records,
            DatasetKind::Biometric => datasets.biometric = records,
        }
    }

    Ok(datasets)
}

/// Concatenate every `*.csv` file in `dir`, dropping exact duplicate rows
pub fn load_dataset(dir: &Path, kind: DatasetKind) -> Result<Vec<RawRecord>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read dataset directory: {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    if files.is_empty() {
        warn!("No CSV files found in {:?}", dir);
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut records = Vec::new();
    let mut duplicates = 0;

    for file in &files {
        let before = records.len();
        duplicates += load_file(file, kind, &mut seen, &mut records)?;
        info!("Loaded {} rows from {:?}", records.len() - before, file);
    }

    if duplicates > 0 {
        info!("{}: removed {} duplicate rows", kind.dir_name(), duplicates);
    }
    info!("{}: {} rows from {} files", kind.dir_name(), records.len(), files.len());

    Ok(records)
}

/// Returns the number of duplicate rows skipped
fn load_file(
    path: &Path,
    kind: DatasetKind,
    seen: &mut HashSet<String>,
    records: &mut Vec<RawRecord>,
) -> Result<usize> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let headers: Vec<String> = rdr
        .headers()
        .with_context(|| format!("Failed to read CSV header: {:?}", path))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let Some(region_idx) = column(REGION_COLUMN) else {
        bail!("{:?}: missing required column '{}'", path, REGION_COLUMN);
    };
    let date_idx = column(DATE_COLUMN);
    if date_idx.is_none() {
        warn!("{:?}: no '{}' column, every row has an unknown month", path, DATE_COLUMN);
    }

    let categories: Vec<(&str, usize)> = kind
        .category_columns()
        .iter()
        .filter_map(|name| match column(*name) {
            Some(idx) => Some((*name, idx)),
            None => {
                warn!("{:?}: no '{}' column, counted as zero", path, name);
                None
            }
        })
        .collect();

    let mut duplicates = 0;
    for result in rdr.records() {
        let row = result.with_context(|| format!("Failed to read row in {:?}", path))?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);

        if !seen.insert(fingerprint(&headers, &row)) {
            duplicates += 1;
            continue;
        }

        let mut counts = Vec::with_capacity(categories.len());
        for (name, idx) in &categories {
            let raw = row.get(*idx).unwrap_or("");
            counts.push((*name, parse_count(raw).with_context(|| {
                format!("{:?} line {}: column '{}'", path, line, name)
            })?));
        }

        let date = date_idx.and_then(|idx| row.get(idx)).and_then(parse_date);
        let record = RawRecord::new(row.get(region_idx).unwrap_or(""), date, counts)
            .with_context(|| format!("{:?} line {}", path, line))?;
        records.push(record);
    }

    Ok(duplicates)
}

/// Blank is zero; anything else must be a finite, non-negative number
fn parse_count(raw: &str) -> Result<f64> {
    if raw.is_empty() {
        return Ok(0.0);
    }
    let value: f64 = raw
        .parse()
        .with_context(|| format!("'{}' is not a number", raw))?;
    if !value.is_finite() || value < 0.0 {
        bail!("'{}' is not a valid count", raw);
    }
    Ok(value)
}

/// Row identity independent of column order across files
fn fingerprint(headers: &[String], row: &csv::StringRecord) -> String {
    let mut fields: Vec<(&str, &str)> = headers
        .iter()
        .map(String::as_str)
        .zip(row.iter())
        .collect();
    fields.sort();

    let mut hasher = Sha256::new();
    for (header, value) in fields {
        hasher.update(header.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(value.as_bytes());
        hasher.update(b"\x1e");
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// WRITING
// ============================================================================

pub const LIFECYCLE_FILE: &str = "lifecycle_enrolment_summary.csv";
pub const STATE_RANKING_FILE: &str = "state_wise_enrolment.csv";
pub const BIOMETRIC_STRESS_FILE: &str = "biometric_update_stress_statewise.csv";
pub const DEMOGRAPHIC_STRESS_FILE: &str = "demographic_update_stress_statewise.csv";
pub const MONTHLY_FILE: &str = "monthly_enrolment.csv";
pub const UPDATE_BURDEN_FILE: &str = "update_burden_index.csv";
pub const MOBILITY_FILE: &str = "migration_mobility_index.csv";
pub const FORECAST_FILE: &str = "monthly_enrolment_forecast.csv";
pub const QUALITY_FILE: &str = "quality_report.json";

/// Serialize rows as CSV; field names become the header
pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("Failed to write row to {:?}", path))?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to flush {:?}", path))?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ForecastSummary {
    forecast_model: ForecastModel,
    confidence_level: f64,
    history_start: YearMonth,
    history_end: YearMonth,
    observed_periods: usize,
    filled_periods: usize,
}

impl From<&Forecast> for ForecastSummary {
    fn from(forecast: &Forecast) -> Self {
        ForecastSummary {
            forecast_model: forecast.model,
            confidence_level: forecast.confidence_level,
            history_start: forecast.history_start,
            history_end: forecast.history_end,
            observed_periods: forecast.observed_periods,
            filled_periods: forecast.filled_periods,
        }
    }
}

/// Forecast metadata (or the reason there is none) and quality report, as JSON
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    #[serde(flatten)]
    forecast: Option<ForecastSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    forecast_error: Option<String>,
    quality: &'a QualityReport,
}

/// Write every table of `report` into `output_dir`. Returns the files written.
///
/// A failed forecast stage writes no forecast CSV (a stale one is removed);
/// the error goes into the JSON summary and every other table is still written.
pub fn write_report(report: &Report, output_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

    let path = |name: &str| output_dir.join(name);
    let mut written = Vec::new();

    write_table(&path(LIFECYCLE_FILE), &report.lifecycle)?;
    written.push(path(LIFECYCLE_FILE));
    write_table(&path(STATE_RANKING_FILE), &report.state_ranking)?;
    written.push(path(STATE_RANKING_FILE));
    write_table(&path(BIOMETRIC_STRESS_FILE), &report.biometric_stress)?;
    written.push(path(BIOMETRIC_STRESS_FILE));
    write_table(&path(DEMOGRAPHIC_STRESS_FILE), &report.demographic_stress)?;
    written.push(path(DEMOGRAPHIC_STRESS_FILE));
    write_table(&path(MONTHLY_FILE), &report.monthly)?;
    written.push(path(MONTHLY_FILE));
    write_table(&path(UPDATE_BURDEN_FILE), &report.update_burden)?;
    written.push(path(UPDATE_BURDEN_FILE));
    write_table(&path(MOBILITY_FILE), &report.mobility)?;
    written.push(path(MOBILITY_FILE));

    let summary = match &report.forecast {
        Ok(forecast) => {
            write_table::<ForecastPoint>(&path(FORECAST_FILE), &forecast.points)?;
            written.push(path(FORECAST_FILE));
            RunSummary {
                forecast: Some(forecast.into()),
                forecast_error: None,
                quality: &report.quality,
            }
        }
        Err(e) => {
            let stale = path(FORECAST_FILE);
            if stale.exists() {
                fs::remove_file(&stale)
                    .with_context(|| format!("Failed to remove stale {:?}", stale))?;
            }
            warn!("No forecast written: {}", e);
            RunSummary {
                forecast: None,
                forecast_error: Some(e.to_string()),
                quality: &report.quality,
            }
        }
    };
    let json = serde_json::to_string_pretty(&summary).context("Failed to serialize quality report")?;
    fs::write(path(QUALITY_FILE), json)
        .with_context(|| format!("Failed to write {:?}", path(QUALITY_FILE)))?;
    written.push(path(QUALITY_FILE));

    info!("Wrote {} files to {:?}", written.len(), output_dir);
    Ok(written)
}

// ============================================================================
// TESTS
// ============================================================================
