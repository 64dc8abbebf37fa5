//! Durable PostgreSQL queue backend.
//!
//! Envelopes live in a single table ordered by a serial id, which gives
//! global FIFO across producers. Dequeue claims the head row with
//! `FOR UPDATE SKIP LOCKED` so concurrent consumers never double-claim,
//! and unacknowledged rows survive process restarts until claimed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::time::Instant;
use tracing::debug;
use vigil_types::TaskEnvelope;

use crate::error::{QueueError, QueueResult};
use crate::stats::{LastProcessedTask, QueueStats};
use crate::{RemediationQueue, QUEUE_NAME};

/// How long an empty dequeue sleeps between head polls.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// PostgreSQL-backed durable FIFO.
#[derive(Debug, Clone)]
pub struct PostgresQueue {
    pool: PgPool,
}

impl PostgresQueue {
    /// Connect and initialize the schema.
    pub async fn new(url: &str, max_connections: u32) -> QueueResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let queue = Self { pool };
        queue.initialize_schema().await?;
        Ok(queue)
    }

    /// Build from an existing pool (shared with the storage backend).
    pub async fn from_pool(pool: PgPool) -> QueueResult<Self> {
        let queue = Self { pool };
        queue.initialize_schema().await?;
        Ok(queue)
    }

    async fn initialize_schema(&self) -> QueueResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS remediation_queue (
                id BIGSERIAL PRIMARY KEY,
                payload JSONB NOT NULL,
                enqueued_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS remediation_queue_stats (
                key TEXT PRIMARY KEY,
                counter BIGINT NOT NULL DEFAULT 0,
                data JSONB
            );
            "#,
        ];
        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn increment(&self, key: &str) -> QueueResult<()> {
        sqlx::query(
            r#"
            INSERT INTO remediation_queue_stats (key, counter)
            VALUES ($1, 1)
            ON CONFLICT (key) DO UPDATE SET counter = remediation_queue_stats.counter + 1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn counter(&self, key: &str) -> QueueResult<u64> {
        let row = sqlx::query("SELECT counter FROM remediation_queue_stats WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(row
            .map(|r| r.try_get::<i64, _>("counter").unwrap_or(0))
            .unwrap_or(0) as u64)
    }

    async fn set_last_processed(&self, last: &LastProcessedTask) -> QueueResult<()> {
        let data = serde_json::to_value(last).map_err(|e| QueueError::Decode(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO remediation_queue_stats (key, counter, data)
            VALUES ('last_processed_task', 0, $1)
            ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn last_processed(&self) -> QueueResult<Option<LastProcessedTask>> {
        let row =
            sqlx::query("SELECT data FROM remediation_queue_stats WHERE key = 'last_processed_task'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
        match row {
            Some(row) => {
                let data: Option<serde_json::Value> = row
                    .try_get("data")
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                match data {
                    Some(value) => serde_json::from_value(value)
                        .map(Some)
                        .map_err(|e| QueueError::Decode(e.to_string())),
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    /// Claim and remove the head row, if any.
    async fn pop_head(&self) -> QueueResult<Option<TaskEnvelope>> {
        let row = sqlx::query(
            r#"
            DELETE FROM remediation_queue
            WHERE id = (
                SELECT id FROM remediation_queue
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING payload
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row
                    .try_get("payload")
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                serde_json::from_value(payload)
                    .map(Some)
                    .map_err(|e| QueueError::Decode(e.to_string()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RemediationQueue for PostgresQueue {
    async fn enqueue(&self, envelope: TaskEnvelope) -> QueueResult<()> {
        let payload =
            serde_json::to_value(&envelope).map_err(|e| QueueError::Decode(e.to_string()))?;
        sqlx::query("INSERT INTO remediation_queue (payload, enqueued_at) VALUES ($1, $2)")
            .bind(payload)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        self.increment("tasks_enqueued").await?;
        debug!(
            task_id = %envelope.task_id,
            action_id = envelope.action_id,
            attempt = envelope.attempt,
            "Task enqueued"
        );
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<TaskEnvelope>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(envelope) = self.pop_head().await? {
                self.increment("tasks_dequeued").await?;
                debug!(
                    task_id = %envelope.task_id,
                    action_id = envelope.action_id,
                    "Task dequeued"
                );
                return Ok(Some(envelope));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn len(&self) -> QueueResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM remediation_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let count: i64 = row
            .try_get("count")
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(count as u64)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        Ok(QueueStats {
            queue_name: QUEUE_NAME.to_string(),
            queue_length: self.len().await?,
            tasks_enqueued: self.counter("tasks_enqueued").await?,
            tasks_dequeued: self.counter("tasks_dequeued").await?,
            tasks_completed: self.counter("tasks_completed").await?,
            tasks_failed: self.counter("tasks_failed").await?,
            last_processed_task: self.last_processed().await?,
        })
    }

    async fn record_completed(&self, envelope: &TaskEnvelope) -> QueueResult<()> {
        self.increment("tasks_completed").await?;
        self.set_last_processed(&LastProcessedTask::from_envelope(envelope))
            .await
    }

    async fn record_failed(&self) -> QueueResult<()> {
        self.increment("tasks_failed").await
    }
}
