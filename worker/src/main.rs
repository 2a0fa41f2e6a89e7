// ==============================================================================
// main.rs - Demand Worker Process
// ==============================================================================
// Description: Background worker that processes forecast jobs from Redis queue
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-03-20
// Version: 1.1.0
// ==============================================================================

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client as RedisClient;
use tracing::{error, info, warn, Level};

mod callback;
mod forecast_runner;
mod queue;

use callback::{CallbackClient, StoreForecastRequest};
use demand_forecaster::csv_data;
use demand_forecaster::engine::EnsembleEngine;
use forecast_runner::ForecastRunner;
use queue::{JobPayload, JobQueue, JobRecord};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    info!("Starting Demand Worker v1.0.0");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize Redis connection
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let redis_client = RedisClient::open(redis_url).context("Failed to create Redis client")?;

    // Create async connection manager
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to create Redis connection manager")?;

    info!("Connected to Redis");

    // Callback target: the gateway's internal store-forecast endpoint
    let callback_base_url = std::env::var("CALLBACK_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8000".to_string());

    // Retry is opt-in; the observed default is a single delivery attempt
    let retry_attempts: u32 = std::env::var("CALLBACK_RETRY_ATTEMPTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let retry_backoff_ms: u64 = std::env::var("CALLBACK_RETRY_BACKOFF_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(500);

    if retry_attempts > 0 {
        info!(
            "Callback retry enabled: {} extra attempt(s), {}ms base backoff",
            retry_attempts, retry_backoff_ms
        );
    }

    // Data directory shared with the gateway process
    let data_dir =
        PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
    let output_dir = data_dir.join("output");

    tokio::fs::create_dir_all(&output_dir)
        .await
        .context("Failed to create output directory")?;

    // Create worker instance
    let worker = Worker::new(
        redis_conn,
        callback_base_url,
        retry_attempts,
        Duration::from_millis(retry_backoff_ms),
        output_dir,
    );

    // Start main processing loop
    info!("Worker ready, waiting for jobs...");
    worker.run().await
}

/// Main worker struct
#[derive(Clone)]
struct Worker {
    redis_conn: ConnectionManager,
    callback_base_url: String,
    retry_attempts: u32,
    retry_backoff: Duration,
    output_dir: PathBuf,
}

impl Worker {
    fn new(
        redis_conn: ConnectionManager,
        callback_base_url: String,
        retry_attempts: u32,
        retry_backoff: Duration,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            redis_conn,
            callback_base_url,
            retry_attempts,
            retry_backoff,
            output_dir,
        }
    }

    /// Main processing loop - polls Redis queue for jobs
    async fn run(&self) -> Result<()> {
        let mut job_queue = JobQueue::new(self.redis_conn.clone());

        loop {
            match job_queue.dequeue().await {
                Ok(Some(payload)) => {
                    info!("Received job: {}", payload.job_id);

                    // Process job in background (don't block queue)
                    let worker = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = worker.process_job(payload).await {
                            error!("Job processing failed: {}", e);
                        }
                    });
                }
                Ok(None) => {
                    // No jobs in queue, wait a bit
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    error!("Failed to dequeue job: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// Process a single job; every failure lands in job state, never in the
    /// queue loop
    async fn process_job(&self, payload: JobPayload) -> Result<()> {
        let job_id = payload.job_id;
        let mut job_queue = JobQueue::new(self.redis_conn.clone());

        info!("Processing job {}", job_id);
        job_queue.set_state(job_id, &JobRecord::running()).await?;

        // Settle time between file write and queue submission on the gateway
        // side; opening the staging file too early races the shared volume
        if payload.start_delay_secs > 0 {
            tokio::time::sleep(Duration::from_secs(payload.start_delay_secs)).await;
        }

        // Run the engine on a blocking thread; history files can be large
        let runner = ForecastRunner::new(EnsembleEngine::new());
        let run_payload = payload;
        let (payload, outcome) =
            tokio::task::spawn_blocking(move || {
                let outcome = runner.run(&run_payload);
                (run_payload, outcome)
            })
            .await
            .context("Forecast task panicked")?;

        let points = match outcome {
            Ok(points) => points,
            Err(e) => {
                let error_msg = e.to_string();
                warn!("Job {} failed: {}", job_id, error_msg);
                job_queue
                    .set_state(job_id, &JobRecord::failure(error_msg))
                    .await?;
                return Ok(());
            }
        };

        info!("Job {} forecast {} point(s)", job_id, points.len());

        // Write the downloadable artifact before delivering results
        let artifact_path = self.output_dir.join(format!("forecast_{}.csv", job_id));
        if let Err(e) =
            csv_data::write_forecast(&artifact_path, &payload.target_product_id, &points)
        {
            // The artifact is a convenience; result delivery still decides
            // the job's fate
            warn!("Failed to write artifact for job {}: {}", job_id, e);
        } else {
            info!("Wrote artifact {:?}", artifact_path);
        }

        // Deliver results through the internal callback
        let client = CallbackClient::new(
            self.callback_base_url.clone(),
            self.retry_attempts,
            self.retry_backoff,
        );

        let request = StoreForecastRequest {
            job_id,
            product_id: payload.target_product_id.clone(),
            results: points.iter().map(callback::ForecastWireRow::from_point).collect(),
        };

        match client.store_forecast(&request).await {
            Ok(response) => {
                info!("Job {} completed successfully", job_id);
                job_queue
                    .set_state(job_id, &JobRecord::success(response))
                    .await?;
            }
            Err(e) => {
                let error_msg = e.to_string();
                error!("Job {} callback failed: {}", job_id, error_msg);
                job_queue
                    .set_state(job_id, &JobRecord::failure(error_msg))
                    .await?;
            }
        }

        Ok(())
    }
}
