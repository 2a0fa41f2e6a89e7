// ==============================================================================
// main.rs - Demand API Gateway Entry Point
// ==============================================================================
// Description: Axum web server for the demand forecasting API
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-03-20
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

mod handlers;
mod models;
mod queue;
mod state;
mod store;
mod validator;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    info!("Starting Demand API Gateway v1.0.0");

    // Load environment variables
    dotenvy::dotenv().ok();

    let server_port: u16 = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);

    // Initialize application state
    let state = AppState::new()
        .await
        .context("Failed to initialize application state")?;

    // Build router with all endpoints
    let app = build_router(state);

    // Bind server
    let addr = SocketAddr::from(([0, 0, 0, 0], server_port));
    info!("API Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    // Configure CORS; origins come from CORS_ALLOWED_ORIGINS (comma-separated)
    let cors_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());
    let allowed_origins: Vec<_> = cors_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_credentials(false)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        // Ingestion
        .route("/upload/", post(handlers::upload))
        // Job submission and lifecycle
        .route("/process-csv/", post(handlers::process_csv))
        .route("/task-status/{task_id}", get(handlers::task_status))
        // Internal write path used by the worker only
        .route("/internal/store-forecast", post(handlers::store_forecast))
        // Reads
        .route("/forecast-history/", get(handlers::forecast_history))
        .route(
            "/forecast-history/{forecast_id}",
            get(handlers::forecast_history_by_id),
        )
        .route("/forecast/{product_id}", get(handlers::forecast_by_product))
        .route("/train-data/{product_id}", get(handlers::train_data))
        .route("/all-train-data", get(handlers::all_train_data))
        .route("/download/{filename}", get(handlers::download_file))
        .layer(
            ServiceBuilder::new()
                // Request tracing
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                // Request body size limit (sales exports stay well under this)
                .layer(DefaultBodyLimit::max(50 * 1024 * 1024)),
        )
        .with_state(state)
}
