// ==============================================================================
// callback.rs - Result Callback Client
// ==============================================================================
// Description: Posts completed forecasts back to the gateway's internal endpoint
// Author: Matt Barham
// Created: 2026-02-10
// Modified: 2026-03-20
// Version: 1.1.0
// ==============================================================================
// The callback is the only write path into the forecast tables. By default it
// makes a single attempt; operators can opt into bounded retry-with-backoff
// via CALLBACK_RETRY_ATTEMPTS (the gateway deduplicates on job_id, so a
// retried delivery cannot double-store).
// ==============================================================================

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use demand_forecaster::models::ForecastPoint;

/// One forecast result row on the internal callback wire
/// (field names must match API gateway models.rs)
#[derive(Debug, Clone, Serialize)]
pub struct ForecastWireRow {
    #[serde(rename = "TANGGAL")]
    pub date: String,
    #[serde(rename = "TOTAL_JUMLAH")]
    pub quantity: f64,
}

impl ForecastWireRow {
    /// Dates travel in the fixed `YYYY-MM-DD` form
    pub fn from_point(point: &ForecastPoint) -> Self {
        Self {
            date: point.date.format("%Y-%m-%d").to_string(),
            quantity: point.quantity,
        }
    }
}

/// Internal store-forecast request body
#[derive(Debug, Serialize)]
pub struct StoreForecastRequest {
    pub job_id: Uuid,
    pub product_id: String,
    pub results: Vec<ForecastWireRow>,
}

/// Errors from the callback delivery
#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("Callback request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Callback returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// HTTP client for the gateway's internal store-forecast endpoint
pub struct CallbackClient {
    http: reqwest::Client,
    base_url: String,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl CallbackClient {
    pub fn new(base_url: String, retry_attempts: u32, retry_backoff: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            retry_attempts,
            retry_backoff,
        }
    }

    /// Deliver a completed forecast; retries only when configured to
    pub async fn store_forecast(
        &self,
        request: &StoreForecastRequest,
    ) -> Result<serde_json::Value, CallbackError> {
        let url = format!("{}/internal/store-forecast", self.base_url);
        let total_attempts = self.retry_attempts + 1;

        let mut last_error: Option<CallbackError> = None;

        for attempt in 0..total_attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.retry_backoff, attempt);
                warn!(
                    "Retrying callback for job {} (attempt {}/{}) after {:?}",
                    request.job_id,
                    attempt + 1,
                    total_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.try_once(&url, request).await {
                Ok(value) => {
                    info!("Callback delivered for job {}", request.job_id);
                    return Ok(value);
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }
        }

        // total_attempts >= 1, so an error is always recorded on this path
        Err(last_error.expect("at least one callback attempt"))
    }

    async fn try_once(
        &self,
        url: &str,
        request: &StoreForecastRequest,
    ) -> Result<serde_json::Value, CallbackError> {
        let response = self.http.post(url).json(request).send().await?;

        let status = response.status();
        if status.is_success() {
            let value = response.json::<serde_json::Value>().await?;
            Ok(value)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(CallbackError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Doubling backoff: base, 2*base, 4*base, ...
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2_u32.saturating_pow(attempt.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_wire_row_formats_dates_iso() {
        let point = ForecastPoint {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            quantity: 12.5,
        };

        let row = ForecastWireRow::from_point(&point);
        assert_eq!(row.date, "2024-01-05");

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["TANGGAL"], "2024-01-05");
        assert_eq!(json["TOTAL_JUMLAH"], 12.5);
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
    }

    #[test]
    fn test_status_error_is_descriptive() {
        let err = CallbackError::Status {
            status: 500,
            body: "database unavailable".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("500"));
        assert!(text.contains("database unavailable"));
    }
}
