// 🔮 Forecaster - trend + yearly seasonality on the monthly enrolment series
//
// Two models, fit once per run on the full (gap-filled) history:
// - Seasonal:   MSTL with a 12-month period, AutoETS on the deseasonalised trend
// - Trend-only: non-seasonal AutoETS, opt-in when history is too short
//
// Input is monthly, so there is no weekly or daily term.

use crate::error::ForecastError;
use crate::period::YearMonth;
use augurs::{
    ets::AutoETS,
    forecaster::{transforms::LinearInterpolator, Forecaster as ModelRunner, Transformer},
    mstl::MSTLModel,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Two full years: the minimum to estimate yearly seasonality
pub const MIN_SEASONAL_PERIODS: usize = 24;

/// Months per seasonal cycle
pub const SEASON_LENGTH: usize = 12;

pub const DEFAULT_HORIZON: usize = 12;

pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

// ============================================================================
// TYPES
// ============================================================================

/// How missing months inside the history are filled before fitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFill {
    #[default]
    Zero,
    /// Straight line between the nearest observed neighbours
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModel {
    Seasonal,
    /// Opt-in degradation when history is too short for seasonality
    TrendOnly,
}

/// `lower_bound <= predicted <= upper_bound` always holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: YearMonth,
    pub predicted: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub model: ForecastModel,
    pub confidence_level: f64,
    pub history_start: YearMonth,
    pub history_end: YearMonth,
    /// Distinct months present in the input
    pub observed_periods: usize,
    /// Months inserted by gap filling
    pub filled_periods: usize,
    /// Exactly `horizon` points, contiguous from `history_end + 1`
    pub points: Vec<ForecastPoint>,
}

// ============================================================================
// FORECASTER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Forecaster {
    pub confidence_level: f64,
    pub min_seasonal_periods: usize,
    pub allow_trend_only: bool,
    pub gap_fill: GapFill,
}

impl Forecaster {
    pub fn new() -> Self {
        Forecaster {
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            min_seasonal_periods: MIN_SEASONAL_PERIODS,
            allow_trend_only: false,
            gap_fill: GapFill::Zero,
        }
    }

    pub fn with_confidence(mut self, confidence_level: f64) -> Self {
        self.confidence_level = confidence_level;
        self
    }

    /// Degrade to trend-only instead of failing on short history
    pub fn with_trend_only_fallback(mut self, allow: bool) -> Self {
        self.allow_trend_only = allow;
        self
    }

    pub fn with_gap_fill(mut self, gap_fill: GapFill) -> Self {
        self.gap_fill = gap_fill;
        self
    }

    /// Never below two full years
    pub fn with_min_seasonal_periods(mut self, periods: usize) -> Self {
        self.min_seasonal_periods = periods.max(MIN_SEASONAL_PERIODS);
        self
    }

    /// Fit on the full history and extrapolate `horizon` months.
    ///
    /// Duplicate periods in `series` are summed. Fewer than
    /// `min_seasonal_periods` observed months is `InsufficientHistory` unless
    /// the trend-only fallback was opted into.
    pub fn forecast(
        &self,
        series: &[(YearMonth, f64)],
        horizon: usize,
    ) -> Result<Forecast, ForecastError> {
        if horizon == 0 {
            return Err(ForecastError::InvalidHorizon(horizon));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ForecastError::InvalidConfidence(self.confidence_level));
        }

        let history = prepare_series(series, self.gap_fill)?;
        let required = self.min_seasonal_periods.max(MIN_SEASONAL_PERIODS);

        let model = if history.observed >= required {
            ForecastModel::Seasonal
        } else if self.allow_trend_only {
            warn!(
                "Only {} months of history up to {} (need {} for seasonality): falling back to trend-only forecast",
                history.observed, history.end, required
            );
            ForecastModel::TrendOnly
        } else {
            return Err(ForecastError::InsufficientHistory {
                observed: history.observed,
                required,
                last_period: history.end,
            });
        };

        let fitted = fit_and_predict(&history.values, model, horizon, self.confidence_level)?;
        let intervals = fitted.intervals.ok_or_else(|| {
            ForecastError::Model("model returned no prediction intervals".to_string())
        })?;

        let points = fitted
            .point
            .iter()
            .zip(intervals.lower.iter().zip(intervals.upper.iter()))
            .enumerate()
            .map(|(i, (point, (lower, upper)))| {
                // Counts cannot go negative
                let predicted = point.max(0.0);
                ForecastPoint {
                    period: history.end.add_months(i as i64 + 1),
                    predicted,
                    lower_bound: lower.max(0.0).min(predicted),
                    upper_bound: upper.max(predicted),
                }
            })
            .collect::<Vec<_>>();

        if points.len() != horizon {
            return Err(ForecastError::Model(format!(
                "expected {} forecast points, got {}",
                horizon,
                points.len()
            )));
        }

        info!(
            "Forecast {} months after {} using {:?} model ({} observed, {} filled)",
            horizon, history.end, model, history.observed, history.filled
        );

        Ok(Forecast {
            model,
            confidence_level: self.confidence_level,
            history_start: history.start,
            history_end: history.end,
            observed_periods: history.observed,
            filled_periods: history.filled,
            points,
        })
    }
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SERIES PREPARATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct History {
    values: Vec<f64>,
    start: YearMonth,
    end: YearMonth,
    observed: usize,
    filled: usize,
}

/// Sort, merge duplicates, and fill every missing month between first and last.
fn prepare_series(series: &[(YearMonth, f64)], gap_fill: GapFill) -> Result<History, ForecastError> {
    let mut by_period: BTreeMap<YearMonth, f64> = BTreeMap::new();
    for (period, value) in series {
        *by_period.entry(*period).or_insert(0.0) += value;
    }

    let (start, end) = match (by_period.keys().next(), by_period.keys().next_back()) {
        (Some(start), Some(end)) => (*start, *end),
        _ => return Err(ForecastError::EmptySeries),
    };

    let span = start.months_until(end) as usize + 1;
    let mut values: Vec<Option<f64>> = vec![None; span];
    for (period, value) in &by_period {
        values[start.months_until(*period) as usize] = Some(*value);
    }

    let filled = values.iter().filter(|v| v.is_none()).count();
    // NaN marks a gap for the model's linear interpolator
    let missing = match gap_fill {
        GapFill::Zero => 0.0,
        GapFill::Linear => f64::NAN,
    };
    let values = values.into_iter().map(|v| v.unwrap_or(missing)).collect();

    Ok(History {
        values,
        start,
        end,
        observed: by_period.len(),
        filled,
    })
}

// ============================================================================
// MODEL
// ============================================================================

fn fit_and_predict(
    values: &[f64],
    model: ForecastModel,
    horizon: usize,
    confidence_level: f64,
) -> Result<augurs::Forecast, ForecastError> {
    let transformers: Vec<Box<dyn Transformer>> = vec![Box::new(LinearInterpolator::default())];

    match model {
        ForecastModel::Seasonal => {
            let trend = AutoETS::non_seasonal().into_trend_model();
            let mstl = MSTLModel::new(vec![SEASON_LENGTH], trend);
            let mut runner = ModelRunner::new(mstl).with_transformers(transformers);
            runner
                .fit(values)
                .map_err(|e| ForecastError::Model(format!("MSTL fit: {e}")))?;
            runner
                .predict(horizon, confidence_level)
                .map_err(|e| ForecastError::Model(format!("MSTL predict: {e}")))
        }
        ForecastModel::TrendOnly => {
            let mut runner =
                ModelRunner::new(AutoETS::non_seasonal()).with_transformers(transformers);
            runner
                .fit(values)
                .map_err(|e| ForecastError::Model(format!("ETS fit: {e}")))?;
            runner
                .predict(horizon, confidence_level)
                .map_err(|e| ForecastError::Model(format!("ETS predict: {e}")))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    /// `months` consecutive months from January 2022, with a December spike
    fn december_spike_series(months: usize) -> Vec<(YearMonth, f64)> {
        (0..months)
            .map(|t| {
                let period = ym(2022, 1).add_months(t as i64);
                let spike = if period.month() == 12 { 800.0 } else { 0.0 };
                let wobble = ((t * 7) % 5) as f64 * 3.0;
                (period, 1_000.0 + 10.0 * t as f64 + spike + wobble)
            })
            .collect()
    }

    #[test]
    fn test_forecast_shape() {
        let series = december_spike_series(36);
        let forecast = Forecaster::new().forecast(&series, 12).unwrap();

        assert_eq!(forecast.model, ForecastModel::Seasonal);
        assert_eq!(forecast.points.len(), 12);
        assert_eq!(forecast.history_end, ym(2024, 12));
        assert_eq!(forecast.points[0].period, ym(2025, 1));

        for pair in forecast.points.windows(2) {
            assert_eq!(pair[0].period.succ(), pair[1].period);
        }
        for p in &forecast.points {
            assert!(p.lower_bound <= p.predicted);
            assert!(p.predicted <= p.upper_bound);
        }
    }

    #[test]
    fn test_december_peak_is_preserved() {
        let series = december_spike_series(36);
        let forecast = Forecaster::new().forecast(&series, 12).unwrap();

        let peak = forecast
            .points
            .iter()
            .max_by(|a, b| a.predicted.total_cmp(&b.predicted))
            .unwrap();

        assert_eq!(peak.period, ym(2025, 12));
        assert!(peak.predicted > forecast.points[10].predicted + 300.0);
    }

    #[test]
    fn test_insufficient_history_is_explicit() {
        let series = december_spike_series(18);
        let err = Forecaster::new().forecast(&series, 12).unwrap_err();

        assert_eq!(
            err,
            ForecastError::InsufficientHistory {
                observed: 18,
                required: 24,
                last_period: ym(2023, 6),
            }
        );
    }

    #[test]
    fn test_trend_only_fallback_is_opt_in() {
        let series: Vec<(YearMonth, f64)> = (0..12)
            .map(|t| {
                let wobble = if t % 2 == 0 { 1.0 } else { -1.0 };
                (ym(2024, 1).add_months(t), 100.0 + 5.0 * t as f64 + wobble)
            })
            .collect();

        let forecast = Forecaster::new()
            .with_trend_only_fallback(true)
            .forecast(&series, 3)
            .unwrap();

        assert_eq!(forecast.model, ForecastModel::TrendOnly);
        assert_eq!(forecast.points.len(), 3);
        assert_eq!(forecast.points[0].period, ym(2025, 1));
        for p in &forecast.points {
            assert!(p.predicted > 120.0);
            assert!(p.lower_bound <= p.predicted && p.predicted <= p.upper_bound);
        }
    }

    #[test]
    fn test_gaps_are_filled_before_fitting() {
        let mut series = december_spike_series(36);
        series.retain(|(p, _)| *p != ym(2023, 5) && *p != ym(2023, 6));

        for gap_fill in [GapFill::Zero, GapFill::Linear] {
            let forecast = Forecaster::new()
                .with_gap_fill(gap_fill)
                .forecast(&series, 12)
                .unwrap();

            assert_eq!(forecast.observed_periods, 34);
            assert_eq!(forecast.filled_periods, 2);
            assert_eq!(forecast.points[0].period, ym(2025, 1));
            assert!(forecast.points.iter().all(|p| p.predicted.is_finite()));
        }
    }

    #[test]
    fn test_gap_fill_values() {
        let series = vec![(ym(2024, 1), 10.0), (ym(2024, 4), 40.0)];

        let history = prepare_series(&series, GapFill::Zero).unwrap();
        assert_eq!(history.values, vec![10.0, 0.0, 0.0, 40.0]);
        assert_eq!(history.filled, 2);

        let history = prepare_series(&series, GapFill::Linear).unwrap();
        assert_eq!(history.values.len(), 4);
        assert!(history.values[1].is_nan() && history.values[2].is_nan());
        assert_eq!(history.values[3], 40.0);
    }

    #[test]
    fn test_duplicate_periods_are_summed() {
        let series = vec![(ym(2024, 2), 5.0), (ym(2024, 1), 1.0), (ym(2024, 2), 6.0)];
        let history = prepare_series(&series, GapFill::Zero).unwrap();

        assert_eq!(history.start, ym(2024, 1));
        assert_eq!(history.values, vec![1.0, 11.0]);
        assert_eq!(history.observed, 2);
    }

    #[test]
    fn test_invalid_inputs() {
        let forecaster = Forecaster::new();
        assert_eq!(forecaster.forecast(&[], 12).unwrap_err(), ForecastError::EmptySeries);
        assert_eq!(
            forecaster.forecast(&december_spike_series(36), 0).unwrap_err(),
            ForecastError::InvalidHorizon(0)
        );
        assert!(matches!(
            Forecaster::new()
                .with_confidence(1.5)
                .forecast(&december_spike_series(36), 12),
            Err(ForecastError::InvalidConfidence(_))
        ));
    }

    #[test]
    fn test_forecasts_are_non_negative() {
        let series: Vec<(YearMonth, f64)> = (0..30)
            .map(|t| {
                let wobble = ((t * 3) % 4) as f64 * 5.0;
                (ym(2022, 1).add_months(t), 3_000.0 - 100.0 * t as f64 + wobble)
            })
            .collect();

        let forecast = Forecaster::new().forecast(&series, 12).unwrap();

        for p in &forecast.points {
            assert!(p.lower_bound >= 0.0);
            assert!(p.lower_bound <= p.predicted && p.predicted <= p.upper_bound);
        }
    }
}
