// ==============================================================================
// models.rs - API Data Models
// ==============================================================================
// Description: Request/response models for the demand forecasting API
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-03-20
// Version: 1.1.0
// ==============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Task state enumeration (worker is the only writer of transitions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failure,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        }
    }

    /// SUCCESS and FAILURE are terminal; no further transitions occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

/// Upload confirmation response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub rows_ingested: u64,
}

/// Query parameters for the process-csv endpoint
#[derive(Debug, Deserialize)]
pub struct ProcessCsvParams {
    pub target_product_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub end_date: Option<NaiveDate>,
}

/// Accepted-for-processing response (202)
#[derive(Debug, Serialize)]
pub struct ProcessAcceptedResponse {
    pub message: String,
    pub task_id: Uuid,
}

/// Task status response; exactly one of status/result/error is populated
#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One forecast result row on the internal callback wire
///
/// Field names follow the upstream point-of-sale export that the rest of the
/// platform already speaks (must match worker callback.rs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastWireRow {
    #[serde(rename = "TANGGAL")]
    pub date: NaiveDate,
    #[serde(rename = "TOTAL_JUMLAH")]
    pub quantity: f64,
}

/// Internal store-forecast request body (posted by the worker)
#[derive(Debug, Deserialize)]
pub struct StoreForecastRequest {
    pub job_id: Uuid,
    pub product_id: String,
    pub results: Vec<ForecastWireRow>,
}

/// Internal store-forecast response
#[derive(Debug, Serialize)]
pub struct StoreForecastResponse {
    pub status: &'static str,
    pub run_id: i64,
    pub stored: u64,
    pub deduplicated: bool,
}

/// One persisted forecast row as served by the query endpoints
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ForecastEntry {
    pub id: i64,
    pub run_id: i64,
    pub product_id: String,
    pub date: NaiveDate,
    pub forecast_quantity: f64,
}

/// One persisted training row as served by the query endpoints
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TrainDataEntry {
    pub product_id: String,
    pub date: NaiveDate,
    pub quantity: f64,
}

/// Query parameters for the train-data endpoint
#[derive(Debug, Deserialize)]
pub struct TrainDataParams {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub end_date: Option<NaiveDate>,
}

/// API information response
#[derive(Debug, Serialize)]
pub struct ApiInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Browsers submit optional date params as empty strings; treat those as absent
fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    match opt.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_serializes_uppercase() {
        assert_eq!(
            serde_json::to_value(TaskState::Pending).unwrap(),
            serde_json::json!("PENDING")
        );
        assert_eq!(
            serde_json::to_value(TaskState::Failure).unwrap(),
            serde_json::json!("FAILURE")
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Success.is_terminal());
        assert!(TaskState::Failure.is_terminal());
    }

    #[test]
    fn test_status_response_omits_absent_fields() {
        let response = TaskStatusResponse {
            state: TaskState::Failure,
            status: None,
            result: None,
            error: Some("forecast engine produced no results".to_string()),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["state"], "FAILURE");
        assert_eq!(json["error"], "forecast engine produced no results");
        assert!(json.get("status").is_none());
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_wire_row_field_names() {
        let row = ForecastWireRow {
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            quantity: 42.5,
        };

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["TANGGAL"], "2024-01-10");
        assert_eq!(json["TOTAL_JUMLAH"], 42.5);
    }

    #[test]
    fn test_process_params_accept_empty_dates() {
        let params: ProcessCsvParams = serde_json::from_value(serde_json::json!({
            "target_product_id": "P-1",
            "start_date": "",
            "end_date": "2024-01-10",
        }))
        .unwrap();

        assert!(params.start_date.is_none());
        assert_eq!(
            params.end_date,
            Some(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
        );
    }
}
