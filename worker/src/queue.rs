// ==============================================================================
// queue.rs - Redis Job Queue Management (Worker Side)
// ==============================================================================
// Description: Job queue operations for consuming forecast jobs from Redis
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-03-20
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::NaiveDate;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const QUEUE_KEY: &str = "demand:job_queue";
const JOB_PREFIX: &str = "demand:job:";

/// Job records expire a day after their last write (must match API gateway)
const JOB_TTL_SECS: u64 = 86400;

/// Task state enumeration (must match API gateway models.rs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failure,
}

/// Job payload from the Redis queue (must match API gateway queue.rs)
#[derive(Debug, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: Uuid,
    pub target_product_id: String,
    /// Staging CSV materialized by the gateway before submission
    pub csv_path: String,
    pub future_step: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Settle time before this worker opens the staging file
    #[serde(default)]
    pub start_delay_secs: u64,
}

/// Per-job state record stored under the job key (must match API gateway)
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
    pub fn running() -> Self {
        Self {
            state: TaskState::Running,
            status: Some("Forecast computation in progress".to_string()),
            result: None,
            error: None,
        }
    }

    pub fn success(result: serde_json::Value) -> Self {
        Self {
            state: TaskState::Success,
            status: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            state: TaskState::Failure,
            status: None,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Job queue manager
pub struct JobQueue {
    conn: ConnectionManager,
}

impl JobQueue {
    /// Create new job queue manager
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Dequeue a job (blocking pop with timeout)
    pub async fn dequeue(&mut self) -> Result<Option<JobPayload>> {
        // BRPOP with 1 second timeout
        let result: Option<(String, String)> = self
            .conn
            .brpop(QUEUE_KEY, 1.0)
            .await
            .context("Failed to pop from queue")?;

        match result {
            Some((_, payload_json)) => {
                let payload: JobPayload = serde_json::from_str(&payload_json)
                    .context("Failed to deserialize job payload")?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    /// Write a job's state record; this worker is the sole writer of
    /// transitions for a given job
    pub async fn set_state(&mut self, job_id: Uuid, record: &JobRecord) -> Result<()> {
        let record_json =
            serde_json::to_string(record).context("Failed to serialize job record")?;

        let job_key = format!("{}{}", JOB_PREFIX, job_id);
        self.conn
            .set_ex::<_, _, ()>(&job_key, &record_json, JOB_TTL_SECS)
            .await
            .context("Failed to store job record")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_match_gateway() {
        assert_eq!(
            serde_json::to_value(TaskState::Running).unwrap(),
            serde_json::json!("RUNNING")
        );
        assert_eq!(
            serde_json::to_value(TaskState::Success).unwrap(),
            serde_json::json!("SUCCESS")
        );
    }

    #[test]
    fn test_failure_record_carries_error_text() {
        let record = JobRecord::failure("callback returned 500");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["state"], "FAILURE");
        assert_eq!(json["error"], "callback returned 500");
        assert!(json.get("result").is_none());
    }
}
