// ==============================================================================
// queue.rs - Redis Job Queue Management
// ==============================================================================
// Description: Job dispatcher for asynchronous forecast computations
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-03-20
// Version: 1.2.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::NaiveDate;
use redis::{Client, Commands};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::TaskState;

const QUEUE_KEY: &str = "demand:job_queue";
const JOB_PREFIX: &str = "demand:job:";

/// Job records expire a day after their last write
const JOB_TTL_SECS: u64 = 86400;

/// Horizon applied when the caller provides no usable value
pub const DEFAULT_HORIZON_DAYS: i64 = 365;

/// Job payload for the Redis queue (must match worker queue.rs)
#[derive(Debug, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: Uuid,
    pub target_product_id: String,
    /// Staging CSV already materialized on durable storage by the caller
    pub csv_path: String,
    pub future_step: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Settle time before the worker opens the staging file
    #[serde(default)]
    pub start_delay_secs: u64,
}

/// Per-job state record stored under the job key (must match worker queue.rs)
#[derive(Debug, Serialize, Deserialize)]
pub struct JobRecord {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    pub fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            status: Some("Task accepted and waiting for a worker".to_string()),
            result: None,
            error: None,
        }
    }
}

/// Submission request; the caller owns staging-file materialization and the
/// job identifier so the staging path can be derived from it
#[derive(Debug)]
pub struct SubmitRequest {
    pub job_id: Uuid,
    pub csv_path: String,
    pub target_product_id: String,
    pub future_step: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Job dispatcher contract: submit work, read lifecycle state
///
/// Injected into handlers so tests can substitute an in-memory queue.
pub trait JobDispatcher: Send + Sync {
    fn submit(&self, request: SubmitRequest) -> Result<Uuid>;
    fn status(&self, job_id: Uuid) -> Result<Option<JobRecord>>;
}

/// Redis-backed job dispatcher
pub struct RedisJobQueue {
    client: Client,
    start_delay_secs: u64,
}

impl RedisJobQueue {
    pub fn new(client: Client, start_delay_secs: u64) -> Self {
        Self {
            client,
            start_delay_secs,
        }
    }
}

impl JobDispatcher for RedisJobQueue {
    /// Enqueue a forecast job and create its PENDING state record
    fn submit(&self, request: SubmitRequest) -> Result<Uuid> {
        let mut conn = self
            .client
            .get_connection()
            .context("Failed to get Redis connection")?;

        let payload = JobPayload {
            job_id: request.job_id,
            target_product_id: request.target_product_id,
            csv_path: request.csv_path,
            future_step: effective_horizon(request.future_step),
            start_date: request.start_date,
            end_date: request.end_date,
            start_delay_secs: self.start_delay_secs,
        };

        let payload_json =
            serde_json::to_string(&payload).context("Failed to serialize job payload")?;

        // Push to queue (LPUSH for FIFO with BRPOP)
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload_json)
            .context("Failed to push job to queue")?;

        // Create the PENDING state record; every later write is the worker's
        let record_json = serde_json::to_string(&JobRecord::pending())
            .context("Failed to serialize job record")?;
        let job_key = format!("{}{}", JOB_PREFIX, payload.job_id);
        conn.set_ex::<_, _, ()>(&job_key, &record_json, JOB_TTL_SECS)
            .context("Failed to store job record")?;

        Ok(payload.job_id)
    }

    /// Read a job's state record; None means unknown or not yet started
    fn status(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        let mut conn = self
            .client
            .get_connection()
            .context("Failed to get Redis connection")?;

        let job_key = format!("{}{}", JOB_PREFIX, job_id);
        let record_json: Option<String> = conn.get(&job_key).context("Failed to get job record")?;

        match record_json {
            Some(json) => {
                let record =
                    serde_json::from_str(&json).context("Failed to deserialize job record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

/// A non-positive horizon falls back to a full year so the engine always
/// receives a usable request
pub fn effective_horizon(future_step: i64) -> i64 {
    if future_step <= 0 {
        DEFAULT_HORIZON_DAYS
    } else {
        future_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_horizon_defaults_non_positive() {
        assert_eq!(effective_horizon(0), DEFAULT_HORIZON_DAYS);
        assert_eq!(effective_horizon(-10), DEFAULT_HORIZON_DAYS);
        assert_eq!(effective_horizon(11), 11);
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = JobPayload {
            job_id: Uuid::new_v4(),
            target_product_id: "P-1".to_string(),
            csv_path: "/data/staging/train_x.csv".to_string(),
            future_step: 11,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 10),
            start_delay_secs: 5,
        };

        let json = serde_json::to_string(&payload).unwrap();
        let back: JobPayload = serde_json::from_str(&json).unwrap();

        assert_eq!(back.job_id, payload.job_id);
        assert_eq!(back.future_step, 11);
        assert_eq!(back.start_date, payload.start_date);
        assert_eq!(back.start_delay_secs, 5);
    }
}
