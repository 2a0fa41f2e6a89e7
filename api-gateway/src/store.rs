// ==============================================================================
// store.rs - Training and Forecast Data Store
// ==============================================================================
// Description: Postgres persistence for training rows and forecast results
// Author: Matt Barham
// Created: 2026-02-10
// Modified: 2026-03-20
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use demand_forecaster::models::TrainingRecord;

use crate::models::{ForecastEntry, TrainDataEntry};

/// Outcome of a store-forecast call
#[derive(Debug)]
pub struct StoreOutcome {
    pub run_id: i64,
    pub stored: u64,
    /// True when the run id already existed and no rows were written
    pub deduplicated: bool,
}

/// Data store facade over the Postgres pool
#[derive(Clone)]
pub struct DataStore {
    pool: PgPool,
}

impl DataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables on startup when they do not exist yet
    ///
    /// train_data carries no uniqueness constraint: ingestion is append-only
    /// and re-uploading a file stores its rows again (see DESIGN.md).
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS train_data (
                id BIGSERIAL PRIMARY KEY,
                product_id TEXT NOT NULL,
                date DATE NOT NULL,
                quantity DOUBLE PRECISION NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create train_data table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS train_data_product_date_idx
             ON train_data (product_id, date)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create train_data index")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS forecast_runs (
                id BIGSERIAL PRIMARY KEY,
                job_id TEXT NOT NULL UNIQUE,
                product_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create forecast_runs table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS forecast_results (
                id BIGSERIAL PRIMARY KEY,
                run_id BIGINT NOT NULL REFERENCES forecast_runs(id),
                product_id TEXT NOT NULL,
                date DATE NOT NULL,
                quantity DOUBLE PRECISION NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create forecast_results table")?;

        Ok(())
    }

    /// Append training rows (plain insert, duplicates are kept)
    pub async fn append_training(&self, records: &[TrainingRecord]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start ingest transaction")?;

        for record in records {
            sqlx::query("INSERT INTO train_data (product_id, date, quantity) VALUES ($1, $2, $3)")
                .bind(&record.product_id)
                .bind(record.date)
                .bind(record.quantity)
                .execute(&mut *tx)
                .await
                .context("Failed to insert training row")?;
        }

        tx.commit().await.context("Failed to commit ingest")?;

        Ok(records.len() as u64)
    }

    /// Training rows for one product, optionally bounded by an inclusive range
    pub async fn train_data(
        &self,
        product_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<TrainDataEntry>> {
        let rows: Vec<TrainDataEntry> = sqlx::query_as(
            "SELECT product_id, date, quantity FROM train_data
             WHERE product_id = $1
             AND ($2::date IS NULL OR date >= $2)
             AND ($3::date IS NULL OR date <= $3)
             ORDER BY date",
        )
        .bind(product_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query train data")?;

        Ok(rows)
    }

    /// Training slice used to stage a forecast job: rows at or before the
    /// cutoff when one is given, otherwise the full product history
    pub async fn train_data_up_to(
        &self,
        product_id: &str,
        cutoff: Option<NaiveDate>,
    ) -> Result<Vec<TrainingRecord>> {
        let rows: Vec<(String, NaiveDate, f64)> = sqlx::query_as(
            "SELECT product_id, date, quantity FROM train_data
             WHERE product_id = $1
             AND ($2::date IS NULL OR date <= $2)
             ORDER BY date",
        )
        .bind(product_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query train data slice")?;

        Ok(rows
            .into_iter()
            .map(|(product_id, date, quantity)| TrainingRecord {
                product_id,
                date,
                quantity,
            })
            .collect())
    }

    /// Every training row, for the CSV export endpoint
    pub async fn all_training(&self) -> Result<Vec<TrainDataEntry>> {
        let rows: Vec<TrainDataEntry> = sqlx::query_as(
            "SELECT product_id, date, quantity FROM train_data ORDER BY product_id, date",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query all train data")?;

        Ok(rows)
    }

    /// Persist one completed forecast run, deduplicating on the job id
    ///
    /// The unique job_id makes redelivery of the worker callback a no-op:
    /// the run row insert loses the conflict and no result rows are written.
    pub async fn store_forecast_run(
        &self,
        job_id: Uuid,
        product_id: &str,
        rows: &[(NaiveDate, f64)],
    ) -> Result<StoreOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start store-forecast transaction")?;

        let inserted: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO forecast_runs (job_id, product_id, created_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (job_id) DO NOTHING
             RETURNING id",
        )
        .bind(job_id.to_string())
        .bind(product_id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to insert forecast run")?;

        let outcome = match inserted {
            Some((run_id,)) => {
                for (date, quantity) in rows {
                    sqlx::query(
                        "INSERT INTO forecast_results (run_id, product_id, date, quantity)
                         VALUES ($1, $2, $3, $4)",
                    )
                    .bind(run_id)
                    .bind(product_id)
                    .bind(date)
                    .bind(quantity)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to insert forecast row")?;
                }

                StoreOutcome {
                    run_id,
                    stored: rows.len() as u64,
                    deduplicated: false,
                }
            }
            None => {
                let (run_id,): (i64,) =
                    sqlx::query_as("SELECT id FROM forecast_runs WHERE job_id = $1")
                        .bind(job_id.to_string())
                        .fetch_one(&mut *tx)
                        .await
                        .context("Failed to look up existing forecast run")?;

                info!("Duplicate store-forecast delivery for job {}, run {}", job_id, run_id);

                StoreOutcome {
                    run_id,
                    stored: 0,
                    deduplicated: true,
                }
            }
        };

        tx.commit()
            .await
            .context("Failed to commit store-forecast")?;

        Ok(outcome)
    }

    /// All persisted forecast rows, newest run first
    pub async fn forecast_history(&self) -> Result<Vec<ForecastEntry>> {
        let rows: Vec<ForecastEntry> = sqlx::query_as(
            "SELECT id, run_id, product_id, date, quantity AS forecast_quantity
             FROM forecast_results ORDER BY run_id DESC, date",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query forecast history")?;

        Ok(rows)
    }

    /// Rows belonging to one forecast run
    pub async fn forecast_by_run(&self, run_id: i64) -> Result<Vec<ForecastEntry>> {
        let rows: Vec<ForecastEntry> = sqlx::query_as(
            "SELECT id, run_id, product_id, date, quantity AS forecast_quantity
             FROM forecast_results WHERE run_id = $1 ORDER BY date",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query forecast run")?;

        Ok(rows)
    }

    /// All persisted forecast rows for one product
    pub async fn forecast_by_product(&self, product_id: &str) -> Result<Vec<ForecastEntry>> {
        let rows: Vec<ForecastEntry> = sqlx::query_as(
            "SELECT id, run_id, product_id, date, quantity AS forecast_quantity
             FROM forecast_results WHERE product_id = $1 ORDER BY run_id DESC, date",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query product forecasts")?;

        Ok(rows)
    }
}
