// ==============================================================================
// handlers.rs - API Request Handlers
// ==============================================================================
// Description: HTTP request handlers for demand forecasting API endpoints
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-03-20
// Version: 1.2.0
// ==============================================================================

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use demand_forecaster::{csv_data, preprocess};

use crate::{
    models::*,
    queue::SubmitRequest,
    state::AppState,
    validator::FileValidator,
};

/// Root endpoint - API information
pub async fn root() -> Json<ApiInfoResponse> {
    Json(ApiInfoResponse {
        service: "Demand API Gateway",
        version: "1.0.0",
        endpoints: vec![
            "/health - Health check",
            "/upload/ - Upload sales history (POST, multipart)",
            "/process-csv/ - Submit forecast job (POST)",
            "/task-status/{task_id} - Job lifecycle state (GET)",
            "/forecast-history/ - All stored forecasts (GET)",
            "/forecast-history/{forecast_id} - One forecast run (GET)",
            "/forecast/{product_id} - Forecasts for a product (GET)",
            "/train-data/{product_id} - Training rows for a product (GET)",
            "/all-train-data - Full training data as CSV (GET)",
            "/download/{filename} - Download an output artifact (GET)",
        ],
    })
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: "1.0.0",
        timestamp: Utc::now(),
    })
}

/// Upload endpoint: save the file verbatim, normalize it, append to the store
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    info!("Received upload request");

    let validator = FileValidator::new();
    let mut saved: Option<(PathBuf, String)> = None;

    // Process multipart form fields
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("sales.csv").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;

                // Validate before writing to disk
                let validated = validator
                    .validate_upload(&filename, &data)
                    .map_err(|e| AppError::BadRequest(format!("Invalid sales file: {}", e)))?;

                info!(
                    "Upload validated: {} ({} bytes, SHA256: {})",
                    validated.safe_name,
                    validated.size,
                    &validated.hash_sha256[..16]
                );

                // Save file verbatim using sanitized filename
                let file_path = state.upload_dir().join(&validated.safe_name);
                let mut file = tokio::fs::File::create(&file_path)
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to create file: {}", e)))?;
                file.write_all(&data)
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to write file: {}", e)))?;

                saved = Some((file_path, validated.safe_name));
            }

            _ => {
                warn!("Unknown multipart field: {}", name);
            }
        }
    }

    let (file_path, safe_name) =
        saved.ok_or_else(|| AppError::BadRequest("Missing file field".to_string()))?;

    // Normalize into canonical rows; schema problems are the client's fault
    let records = {
        let file_path = file_path.clone();
        tokio::task::spawn_blocking(move || preprocess::normalize_file(&file_path))
            .await
            .map_err(|e| AppError::Internal(format!("Preprocessing task failed: {}", e)))?
            .map_err(|e| {
                AppError::BadRequest(format!("Failed to preprocess {}: {}", safe_name, e))
            })?
    };

    let rows_ingested = state
        .store()
        .append_training(&records)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store training rows: {}", e)))?;

    info!("Ingested {} training row(s) from {}", rows_ingested, safe_name);

    Ok(Json(UploadResponse {
        message: format!("File {} uploaded and ingested", safe_name),
        rows_ingested,
    }))
}

/// Process-trigger endpoint: stage a training slice and enqueue a forecast job
pub async fn process_csv(
    State(state): State<AppState>,
    Query(params): Query<ProcessCsvParams>,
) -> Result<(StatusCode, Json<ProcessAcceptedResponse>), AppError> {
    info!(
        "Received forecast request for product {} ({:?}..{:?})",
        params.target_product_id, params.start_date, params.end_date
    );

    let slice = state
        .store()
        .train_data_up_to(&params.target_product_id, params.start_date)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read training data: {}", e)))?;

    if slice.is_empty() {
        return Err(AppError::NotFound(format!(
            "No train data found for product {}",
            params.target_product_id
        )));
    }

    // Slice is date-ordered; the last row anchors the horizon so it covers
    // the requested window exactly
    let last_train_date = slice[slice.len() - 1].date;
    let future_step = match params.end_date {
        Some(end_date) => compute_future_step(last_train_date, end_date),
        None => 0, // dispatcher applies the full-year default
    };

    let job_id = Uuid::new_v4();

    // Per-job staging path so concurrent requests cannot clobber each other
    let staging_path = state.staging_dir().join(format!("train_{}.csv", job_id));
    {
        let staging_path = staging_path.clone();
        tokio::task::spawn_blocking(move || csv_data::write_records(&staging_path, &slice))
            .await
            .map_err(|e| AppError::Internal(format!("Staging task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to write staging file: {}", e)))?;
    }

    let task_id = state
        .dispatcher()
        .submit(SubmitRequest {
            job_id,
            csv_path: staging_path.to_string_lossy().to_string(),
            target_product_id: params.target_product_id.clone(),
            future_step,
            start_date: params.start_date,
            end_date: params.end_date,
        })
        .map_err(|e| AppError::Internal(format!("Failed to submit job: {}", e)))?;

    info!(
        "Job {} queued for product {} (future_step={})",
        task_id, params.target_product_id, future_step
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ProcessAcceptedResponse {
            message: "Forecast task submitted".to_string(),
            task_id,
        }),
    ))
}

/// Horizon covering the requested window with no off-by-one gap
pub fn compute_future_step(last_train_date: NaiveDate, end_date: NaiveDate) -> i64 {
    end_date.signed_duration_since(last_train_date).num_days() + 1
}

/// Task status endpoint: pure read-through to the job dispatcher
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskStatusResponse>, AppError> {
    let record = state
        .dispatcher()
        .status(task_id)
        .map_err(|e| AppError::Internal(format!("Failed to read task state: {}", e)))?;

    let response = match record {
        // Missing record: never submitted here, or expired
        None => TaskStatusResponse {
            state: TaskState::Pending,
            status: Some("Task is unknown or not yet started".to_string()),
            result: None,
            error: None,
        },
        Some(record) => TaskStatusResponse {
            state: record.state,
            status: record.status,
            result: record.result,
            error: record.error,
        },
    };

    Ok(Json(response))
}

/// Internal store-forecast endpoint, called only by the worker
pub async fn store_forecast(
    State(state): State<AppState>,
    Json(request): Json<StoreForecastRequest>,
) -> Result<Json<StoreForecastResponse>, AppError> {
    info!(
        "Storing forecast for job {} (product {}, {} row(s))",
        request.job_id,
        request.product_id,
        request.results.len()
    );

    let rows: Vec<(NaiveDate, f64)> = request
        .results
        .iter()
        .map(|row| (row.date, row.quantity))
        .collect();

    let outcome = state
        .store()
        .store_forecast_run(request.job_id, &request.product_id, &rows)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to persist forecast: {}", e)))?;

    Ok(Json(StoreForecastResponse {
        status: "ok",
        run_id: outcome.run_id,
        stored: outcome.stored,
        deduplicated: outcome.deduplicated,
    }))
}

/// All stored forecast rows
pub async fn forecast_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<ForecastEntry>>, AppError> {
    let rows = state
        .store()
        .forecast_history()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to query forecast history: {}", e)))?;

    Ok(Json(rows))
}

/// Stored forecast rows for one run id
pub async fn forecast_history_by_id(
    State(state): State<AppState>,
    Path(forecast_id): Path<i64>,
) -> Result<Json<Vec<ForecastEntry>>, AppError> {
    let rows = state
        .store()
        .forecast_by_run(forecast_id)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to query forecast run: {}", e)))?;

    if rows.is_empty() {
        return Err(AppError::NotFound(format!(
            "No forecast data found for id {}",
            forecast_id
        )));
    }

    Ok(Json(rows))
}

/// Stored forecast rows for one product
pub async fn forecast_by_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<Vec<ForecastEntry>>, AppError> {
    let rows = state
        .store()
        .forecast_by_product(&product_id)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to query product forecasts: {}", e)))?;

    if rows.is_empty() {
        return Err(AppError::NotFound(
            "No forecast data found for the specified product ID".to_string(),
        ));
    }

    Ok(Json(rows))
}

/// Training rows for one product, optionally bounded by a date range
pub async fn train_data(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(params): Query<TrainDataParams>,
) -> Result<Json<Vec<TrainDataEntry>>, AppError> {
    let rows = state
        .store()
        .train_data(&product_id, params.start_date, params.end_date)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to query train data: {}", e)))?;

    if rows.is_empty() {
        return Err(AppError::NotFound("No train data found".to_string()));
    }

    Ok(Json(rows))
}

/// Full training data as a CSV attachment (one conversion pass, no
/// per-row response buffering beyond the converted payload)
pub async fn all_train_data(State(state): State<AppState>) -> Result<Response, AppError> {
    let rows = state
        .store()
        .all_training()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to query train data: {}", e)))?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["product_id", "date", "quantity"])
        .map_err(|e| AppError::Internal(format!("Failed to write CSV header: {}", e)))?;
    for row in &rows {
        let date = row.date.format("%Y-%m-%d").to_string();
        let quantity = row.quantity.to_string();
        writer
            .write_record([row.product_id.as_str(), date.as_str(), quantity.as_str()])
            .map_err(|e| AppError::Internal(format!("Failed to write CSV row: {}", e)))?;
    }
    let csv_bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to finalize CSV: {}", e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        "text/csv; charset=utf-8".parse().unwrap(),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        "attachment; filename=\"train_data.csv\"".parse().unwrap(),
    );

    info!("Serving train data export ({} row(s))", rows.len());

    Ok((headers, axum::body::Body::from(csv_bytes)).into_response())
}

/// Download an artifact from the output directory
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let validator = FileValidator::new();
    let safe_name = validator
        .sanitize_filename(&filename)
        .map_err(|e| AppError::BadRequest(format!("Invalid filename: {}", e)))?;

    let file_path = state.output_dir().join(&safe_name);
    if !file_path.exists() {
        return Err(AppError::NotFound(format!("File {} not found", safe_name)));
    }

    let file_metadata = tokio::fs::metadata(&file_path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to get file metadata: {}", e)))?;
    let file_size = file_metadata.len();

    let file = tokio::fs::File::open(&file_path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open file: {}", e)))?;

    let stream = ReaderStream::new(file);
    let body = axum::body::Body::from_stream(stream);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        "application/octet-stream".parse().unwrap(),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        file_size.to_string().parse().unwrap(),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", safe_name)
            .parse()
            .unwrap(),
    );

    info!("Serving download: {} ({} bytes)", safe_name, file_size);

    Ok((headers, body).into_response())
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Internal server error", msg),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_future_step_covers_requested_window() {
        // Latest training row 2023-12-31, window ends 2024-01-10: eleven days
        // of horizon reach the end of the window inclusively
        let last = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(compute_future_step(last, end), 11);
    }

    #[test]
    fn test_future_step_window_before_history_is_non_positive() {
        // A window that ends before the training data produces a non-positive
        // step; the dispatcher then falls back to the full-year default
        let last = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(compute_future_step(last, end) <= 0);
    }
}
