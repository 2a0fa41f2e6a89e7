// ==============================================================================
// forecast_runner.rs - Forecast Job Execution
// ==============================================================================
// Description: Runs the forecast engine against a staged training slice
// Author: Matt Barham
// Created: 2026-02-10
// Modified: 2026-03-20
// Version: 1.2.0
// ==============================================================================

use std::path::Path;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use demand_forecaster::csv_data::{self, CsvDataError};
use demand_forecaster::engine::{EngineError, ForecastEngine};
use demand_forecaster::models::ForecastPoint;

use crate::queue::JobPayload;

/// Errors that terminate a job in the FAILURE state
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to load staging file: {0}")]
    Staging(#[from] CsvDataError),

    #[error("Forecast engine failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Forecast engine produced no results")]
    EmptyForecast,
}

/// Executes one forecast job end to end (load, forecast, clip)
pub struct ForecastRunner<E: ForecastEngine> {
    engine: E,
}

impl<E: ForecastEngine> ForecastRunner<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Run the engine for one job payload
    ///
    /// Returns the future segment, clipped to the payload's date range when
    /// both bounds are present. Single attempt; every error maps to a
    /// terminal FAILURE upstream.
    pub fn run(&self, payload: &JobPayload) -> Result<Vec<ForecastPoint>, RunnerError> {
        let history = csv_data::read_records(Path::new(&payload.csv_path))?;
        info!(
            "Loaded {} staged training row(s) for job {}",
            history.len(),
            payload.job_id
        );

        let points = self.engine.forecast(
            &history,
            &payload.target_product_id,
            payload.future_step,
        )?;

        if points.is_empty() {
            return Err(RunnerError::EmptyForecast);
        }

        let clipped = clip_to_range(points, payload.start_date, payload.end_date);
        if clipped.is_empty() {
            return Err(RunnerError::EmptyForecast);
        }

        Ok(clipped)
    }
}

/// Keep points inside the inclusive [start, end] window, preserving order
///
/// Clipping only applies when both bounds are present; a half-open request
/// passes the forecast through untouched.
pub fn clip_to_range(
    points: Vec<ForecastPoint>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Vec<ForecastPoint> {
    match (start_date, end_date) {
        (Some(start), Some(end)) => points
            .into_iter()
            .filter(|p| p.date >= start && p.date <= end)
            .collect(),
        _ => points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use demand_forecaster::engine::EnsembleEngine;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use uuid::Uuid;

    fn points(start: NaiveDate, n: i64) -> Vec<ForecastPoint> {
        (0..n)
            .map(|i| ForecastPoint {
                date: start + Duration::days(i),
                quantity: i as f64,
            })
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_clip_is_inclusive_and_order_preserving() {
        let input = points(date(2024, 1, 1), 10);

        let clipped = clip_to_range(input, Some(date(2024, 1, 3)), Some(date(2024, 1, 6)));

        assert_eq!(clipped.len(), 4);
        assert_eq!(clipped[0].date, date(2024, 1, 3));
        assert_eq!(clipped[3].date, date(2024, 1, 6));
        // Order preserved
        for pair in clipped.windows(2) {
            assert!(pair[0].date < pair[1].date);
        }
    }

    #[test]
    fn test_clip_without_both_bounds_is_a_passthrough() {
        let input = points(date(2024, 1, 1), 5);

        assert_eq!(clip_to_range(input.clone(), Some(date(2024, 1, 3)), None).len(), 5);
        assert_eq!(clip_to_range(input.clone(), None, Some(date(2024, 1, 3))).len(), 5);
        assert_eq!(clip_to_range(input, None, None).len(), 5);
    }

    fn payload_for(csv_path: &str, product: &str, future_step: i64) -> JobPayload {
        JobPayload {
            job_id: Uuid::new_v4(),
            target_product_id: product.to_string(),
            csv_path: csv_path.to_string(),
            future_step,
            start_date: None,
            end_date: None,
            start_delay_secs: 0,
        }
    }

    #[test]
    fn test_run_forecasts_staged_history() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "product_id,date,quantity").unwrap();
        for day in 1..=14 {
            writeln!(file, "P-1,2024-01-{:02},10", day).unwrap();
        }
        file.flush().unwrap();

        let runner = ForecastRunner::new(EnsembleEngine::new());
        let payload = payload_for(file.path().to_str().unwrap(), "P-1", 7);

        let result = runner.run(&payload).unwrap();

        assert_eq!(result.len(), 7);
        assert_eq!(result[0].date, date(2024, 1, 15));
    }

    #[test]
    fn test_run_fails_for_unknown_product() {
        // Engine errors terminate the job rather than succeeding empty
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "product_id,date,quantity").unwrap();
        writeln!(file, "P-1,2024-01-01,10").unwrap();
        file.flush().unwrap();

        let runner = ForecastRunner::new(EnsembleEngine::new());
        let payload = payload_for(file.path().to_str().unwrap(), "P-404", 7);

        let err = runner.run(&payload).unwrap_err();
        assert!(matches!(err, RunnerError::Engine(_)));
    }

    #[test]
    fn test_run_fails_on_missing_staging_file() {
        let runner = ForecastRunner::new(EnsembleEngine::new());
        let payload = payload_for("/nonexistent/train.csv", "P-1", 7);

        let err = runner.run(&payload).unwrap_err();
        assert!(matches!(err, RunnerError::Staging(_)));
    }

    #[test]
    fn test_run_clips_to_requested_window() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "product_id,date,quantity").unwrap();
        for day in 1..=14 {
            writeln!(file, "P-1,2024-01-{:02},10", day).unwrap();
        }
        file.flush().unwrap();

        let runner = ForecastRunner::new(EnsembleEngine::new());
        let mut payload = payload_for(file.path().to_str().unwrap(), "P-1", 10);
        payload.start_date = Some(date(2024, 1, 16));
        payload.end_date = Some(date(2024, 1, 18));

        let result = runner.run(&payload).unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].date, date(2024, 1, 16));
        assert_eq!(result[2].date, date(2024, 1, 18));
    }
}
