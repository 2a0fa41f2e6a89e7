// ==============================================================================
// engine.rs - Forecast Engine
// ==============================================================================
// Description: Model-averaging forecast engine over daily sales history
// Author: Matt Barham
// Created: 2026-02-12
// Modified: 2026-03-20
// Version: 1.2.0
// ==============================================================================
// The engine combines three simple component models (window mean, drift,
// weekly seasonal-naive) and averages them, weighted by inverse one-step
// in-sample error. Components with no history to support them fall back to
// the last observed value.
// ==============================================================================

use chrono::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::{ForecastPoint, TrainingRecord};

/// Window used by the mean component
const MEAN_WINDOW: usize = 30;

/// Weekly seasonality lag
const SEASONAL_LAG: usize = 7;

/// Guard against division by zero when a component fits the history exactly
const WEIGHT_EPSILON: f64 = 1e-6;

/// Errors that can occur while computing a forecast
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No history rows for product {0}")]
    NoHistory(String),

    #[error("Forecast horizon must be at least 1 day, got {0}")]
    InvalidHorizon(i64),
}

/// A forecasting strategy over daily sales history
///
/// Implementations must return one point per future day, in chronological
/// order, starting the day after the last history row for the target product.
pub trait ForecastEngine {
    fn forecast(
        &self,
        history: &[TrainingRecord],
        target_product_id: &str,
        future_step: i64,
    ) -> Result<Vec<ForecastPoint>, EngineError>;
}

/// Weighted model-averaging engine (the default production engine)
#[derive(Debug, Clone, Default)]
pub struct EnsembleEngine;

impl EnsembleEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ForecastEngine for EnsembleEngine {
    fn forecast(
        &self,
        history: &[TrainingRecord],
        target_product_id: &str,
        future_step: i64,
    ) -> Result<Vec<ForecastPoint>, EngineError> {
        if future_step < 1 {
            return Err(EngineError::InvalidHorizon(future_step));
        }

        // Restrict to the target product and order by date
        let mut rows: Vec<&TrainingRecord> = history
            .iter()
            .filter(|r| r.product_id == target_product_id)
            .collect();
        rows.sort_by_key(|r| r.date);

        if rows.is_empty() {
            return Err(EngineError::NoHistory(target_product_id.to_string()));
        }

        let values: Vec<f64> = rows.iter().map(|r| r.quantity).collect();
        let last_date = rows[rows.len() - 1].date;

        let weights = component_weights(&values);
        debug!(
            "Component weights for {}: mean={:.3} drift={:.3} seasonal={:.3}",
            target_product_id, weights[0], weights[1], weights[2]
        );

        let mut points = Vec::with_capacity(future_step as usize);
        for step in 1..=future_step {
            let combined = weights[0] * mean_component(&values, step)
                + weights[1] * drift_component(&values, step)
                + weights[2] * seasonal_component(&values, step);

            points.push(ForecastPoint {
                date: last_date + Duration::days(step),
                // Demand cannot go negative
                quantity: combined.max(0.0),
            });
        }

        Ok(points)
    }
}

/// Mean of the most recent observations
fn mean_component(values: &[f64], _step: i64) -> f64 {
    let window = values.len().min(MEAN_WINDOW);
    let tail = &values[values.len() - window..];
    tail.iter().sum::<f64>() / window as f64
}

/// Last value extended along the average historical slope
fn drift_component(values: &[f64], step: i64) -> f64 {
    let last = values[values.len() - 1];
    if values.len() < 2 {
        return last;
    }
    let slope = (last - values[0]) / (values.len() - 1) as f64;
    last + slope * step as f64
}

/// Value from the same weekday one season back
fn seasonal_component(values: &[f64], step: i64) -> f64 {
    if values.len() < SEASONAL_LAG {
        return values[values.len() - 1];
    }
    let offset = ((step - 1).rem_euclid(SEASONAL_LAG as i64)) as usize;
    values[values.len() - SEASONAL_LAG + offset]
}

/// Inverse one-step in-sample error per component, normalized to sum to 1
fn component_weights(values: &[f64]) -> [f64; 3] {
    if values.len() < 2 {
        return [1.0 / 3.0; 3];
    }

    let components: [fn(&[f64], i64) -> f64; 3] =
        [mean_component, drift_component, seasonal_component];

    let mut raw = [0.0_f64; 3];
    for (i, component) in components.iter().enumerate() {
        let mut abs_err = 0.0;
        let mut n = 0usize;
        for split in 1..values.len() {
            let predicted = component(&values[..split], 1);
            abs_err += (values[split] - predicted).abs();
            n += 1;
        }
        let mae = abs_err / n as f64;
        raw[i] = 1.0 / (mae + WEIGHT_EPSILON);
    }

    let total: f64 = raw.iter().sum();
    [raw[0] / total, raw[1] / total, raw[2] / total]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn history(product_id: &str, start: NaiveDate, quantities: &[f64]) -> Vec<TrainingRecord> {
        quantities
            .iter()
            .enumerate()
            .map(|(i, &quantity)| TrainingRecord {
                product_id: product_id.to_string(),
                date: start + Duration::days(i as i64),
                quantity,
            })
            .collect()
    }

    #[test]
    fn test_forecast_length_and_consecutive_dates() {
        let start = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let rows = history("P-1", start, &[5.0, 6.0, 7.0, 6.0, 5.0, 6.0, 7.0, 6.0]);

        let points = EnsembleEngine::new().forecast(&rows, "P-1", 10).unwrap();

        assert_eq!(points.len(), 10);
        let last_train = start + Duration::days(7);
        for (i, point) in points.iter().enumerate() {
            assert_eq!(point.date, last_train + Duration::days(i as i64 + 1));
        }
    }

    #[test]
    fn test_constant_history_forecasts_constant_value() {
        let start = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let rows = history("P-1", start, &[8.0; 21]);

        let points = EnsembleEngine::new().forecast(&rows, "P-1", 5).unwrap();

        for point in points {
            assert!((point.quantity - 8.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_forecast_ignores_other_products() {
        let start = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let mut rows = history("P-1", start, &[100.0; 10]);
        rows.extend(history("P-2", start, &[1.0; 10]));

        let points = EnsembleEngine::new().forecast(&rows, "P-2", 3).unwrap();

        for point in points {
            assert!(point.quantity < 50.0);
        }
    }

    #[test]
    fn test_unknown_product_is_an_error() {
        let start = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let rows = history("P-1", start, &[5.0, 6.0]);

        let err = EnsembleEngine::new()
            .forecast(&rows, "P-404", 3)
            .unwrap_err();
        assert!(matches!(err, EngineError::NoHistory(_)));
    }

    #[test]
    fn test_negative_trend_clamps_at_zero() {
        let start = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let rows = history("P-1", start, &[10.0, 8.0, 6.0, 4.0, 2.0]);

        let points = EnsembleEngine::new().forecast(&rows, "P-1", 30).unwrap();

        for point in points {
            assert!(point.quantity >= 0.0);
        }
    }

    #[test]
    fn test_invalid_horizon() {
        let start = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let rows = history("P-1", start, &[5.0]);

        let err = EnsembleEngine::new().forecast(&rows, "P-1", 0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidHorizon(0)));
    }
}
