// ==============================================================================
// state.rs - Application State Management
// ==============================================================================
// Description: Shared application state for the demand API gateway
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-03-20
// Version: 1.1.0
// ==============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use sqlx::postgres::PgPoolOptions;

use crate::queue::{JobDispatcher, RedisJobQueue};
use crate::store::DataStore;

/// Settle time given to the worker before it opens a staging file
const DEFAULT_START_DELAY_SECS: u64 = 5;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Training and forecast persistence
    pub store: DataStore,

    /// Job dispatcher (Redis-backed in production, swappable in tests)
    pub dispatcher: Arc<dyn JobDispatcher>,

    /// Upload area (files saved verbatim)
    pub upload_dir: PathBuf,

    /// Staging area (per-job training slices)
    pub staging_dir: PathBuf,

    /// Output area (downloadable artifacts)
    pub output_dir: PathBuf,
}

impl AppState {
    /// Create new application state from environment
    pub async fn new() -> Result<Self> {
        // Get database URL from environment
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        // Create PostgreSQL pool
        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let store = DataStore::new(db_pool);
        store
            .ensure_schema()
            .await
            .context("Failed to prepare database schema")?;

        // Get Redis URL from environment
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        // Create Redis client
        let redis_client =
            RedisClient::open(redis_url).context("Failed to create Redis client")?;

        // Test Redis connection
        let mut conn = redis_client
            .get_connection()
            .context("Failed to connect to Redis")?;
        redis::cmd("PING")
            .query::<String>(&mut conn)
            .context("Redis PING failed")?;

        let start_delay_secs = std::env::var("QUEUE_START_DELAY_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_START_DELAY_SECS);

        let dispatcher: Arc<dyn JobDispatcher> =
            Arc::new(RedisJobQueue::new(redis_client, start_delay_secs));

        // Data directory shared with the worker process
        let data_dir = PathBuf::from(
            std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
        );

        let upload_dir = data_dir.join("uploads");
        let staging_dir = data_dir.join("staging");
        let output_dir = data_dir.join("output");

        // Create directories if they don't exist
        tokio::fs::create_dir_all(&upload_dir)
            .await
            .context("Failed to create upload directory")?;
        tokio::fs::create_dir_all(&staging_dir)
            .await
            .context("Failed to create staging directory")?;
        tokio::fs::create_dir_all(&output_dir)
            .await
            .context("Failed to create output directory")?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                store,
                dispatcher,
                upload_dir,
                staging_dir,
                output_dir,
            }),
        })
    }

    /// Get data store
    pub fn store(&self) -> &DataStore {
        &self.inner.store
    }

    /// Get job dispatcher
    pub fn dispatcher(&self) -> &Arc<dyn JobDispatcher> {
        &self.inner.dispatcher
    }

    /// Get upload directory
    pub fn upload_dir(&self) -> &PathBuf {
        &self.inner.upload_dir
    }

    /// Get staging directory
    pub fn staging_dir(&self) -> &PathBuf {
        &self.inner.staging_dir
    }

    /// Get output directory
    pub fn output_dir(&self) -> &PathBuf {
        &self.inner.output_dir
    }
}
