//! PostgreSQL storage implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use vigil_types::{ActionRecord, ActionStatus, MetricSample};

use crate::error::{StorageError, StorageResult};
use crate::traits::{ActionFilter, ActionStorage, MetricStorage, Storage};

const ACTION_COLUMNS: &str =
    "id, target, action, status, details, started_at, updated_at, attempts, last_error";

/// PostgreSQL-backed storage.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize the schema.
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    /// Build from an existing pool (shared with the queue backend).
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                value DOUBLE PRECISION NOT NULL,
                tags JSONB NOT NULL DEFAULT '{}',
                timestamp TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS metrics_name ON metrics(name);"#,
            r#"CREATE INDEX IF NOT EXISTS metrics_timestamp ON metrics(timestamp DESC);"#,
            r#"
            CREATE TABLE IF NOT EXISTS actions (
                id BIGSERIAL PRIMARY KEY,
                target TEXT NOT NULL,
                action TEXT NOT NULL,
                status TEXT NOT NULL,
                details TEXT,
                started_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS actions_status ON actions(status);"#,
            r#"CREATE INDEX IF NOT EXISTS actions_target ON actions(target);"#,
            r#"CREATE INDEX IF NOT EXISTS actions_started_at ON actions(started_at DESC);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn row_to_metric(row: &PgRow) -> StorageResult<MetricSample> {
        let tags: serde_json::Value = row
            .try_get("tags")
            .map_err(|e| StorageError::Query(e.to_string()))?;
        let tags = serde_json::from_value(tags)
            .map_err(|e| StorageError::InvalidData(format!("tags decode error: {e}")))?;
        Ok(MetricSample {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::Query(e.to_string()))?,
            name: row
                .try_get("name")
                .map_err(|e| StorageError::Query(e.to_string()))?,
            value: row
                .try_get("value")
                .map_err(|e| StorageError::Query(e.to_string()))?,
            tags,
            timestamp: row
                .try_get("timestamp")
                .map_err(|e| StorageError::Query(e.to_string()))?,
        })
    }

    fn row_to_action(row: &PgRow) -> StorageResult<ActionRecord> {
        let status: String = row
            .try_get("status")
            .map_err(|e| StorageError::Query(e.to_string()))?;
        let status = status
            .parse::<ActionStatus>()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        let attempts: i32 = row
            .try_get("attempts")
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(ActionRecord {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::Query(e.to_string()))?,
            target: row
                .try_get("target")
                .map_err(|e| StorageError::Query(e.to_string()))?,
            action: row
                .try_get("action")
                .map_err(|e| StorageError::Query(e.to_string()))?,
            status,
            details: row
                .try_get("details")
                .map_err(|e| StorageError::Query(e.to_string()))?,
            started_at: row
                .try_get("started_at")
                .map_err(|e| StorageError::Query(e.to_string()))?,
            updated_at: row
                .try_get("updated_at")
                .map_err(|e| StorageError::Query(e.to_string()))?,
            attempts: attempts as u32,
            last_error: row
                .try_get("last_error")
                .map_err(|e| StorageError::Query(e.to_string()))?,
        })
    }

    /// Resolve a CAS miss into Conflict (wrong state) or NotFound.
    async fn cas_miss(&self, id: i64, expected: ActionStatus) -> StorageError {
        match self.get_action(id).await {
            Ok(Some(current)) => StorageError::Conflict(format!(
                "action {id} is {}, expected {expected}",
                current.status
            )),
            Ok(None) => StorageError::NotFound(format!("action {id}")),
            Err(err) => err,
        }
    }
}

#[async_trait]
impl MetricStorage for PostgresStorage {
    async fn insert_metric(&self, sample: MetricSample) -> StorageResult<i64> {
        let tags = serde_json::to_value(&sample.tags)
            .map_err(|e| StorageError::InvalidData(format!("tags encode error: {e}")))?;
        let row = sqlx::query(
            r#"
            INSERT INTO metrics (name, value, tags, timestamp)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&sample.name)
        .bind(sample.value)
        .bind(tags)
        .bind(sample.timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        row.try_get("id")
            .map_err(|e| StorageError::Query(e.to_string()))
    }

    async fn recent_metrics(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<MetricSample>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, value, tags, timestamp
            FROM metrics
            WHERE timestamp >= $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.iter().map(Self::row_to_metric).collect()
    }
}

#[async_trait]
impl ActionStorage for PostgresStorage {
    async fn create_action(&self, record: ActionRecord) -> StorageResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO actions (target, action, status, details, started_at, updated_at, attempts, last_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&record.target)
        .bind(&record.action)
        .bind(record.status.as_str())
        .bind(&record.details)
        .bind(record.started_at)
        .bind(record.updated_at)
        .bind(record.attempts as i32)
        .bind(&record.last_error)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        row.try_get("id")
            .map_err(|e| StorageError::Query(e.to_string()))
    }

    async fn claim_action(&self, id: i64) -> StorageResult<ActionRecord> {
        let query = format!(
            r#"
            UPDATE actions
            SET status = 'running', updated_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {ACTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match row {
            Some(row) => Self::row_to_action(&row),
            None => Err(self.cas_miss(id, ActionStatus::Pending).await),
        }
    }

    async fn mark_completed(&self, id: i64, details: Option<String>) -> StorageResult<ActionRecord> {
        let query = format!(
            r#"
            UPDATE actions
            SET status = 'completed', details = COALESCE($2, details),
                last_error = NULL, updated_at = $3
            WHERE id = $1 AND status = 'running'
            RETURNING {ACTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(details)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match row {
            Some(row) => Self::row_to_action(&row),
            None => Err(self.cas_miss(id, ActionStatus::Running).await),
        }
    }

    async fn mark_failed(&self, id: i64, error: &str) -> StorageResult<ActionRecord> {
        let query = format!(
            r#"
            UPDATE actions
            SET status = 'failed', last_error = $2, updated_at = $3
            WHERE id = $1 AND status = 'running'
            RETURNING {ACTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(error)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match row {
            Some(row) => Self::row_to_action(&row),
            None => Err(self.cas_miss(id, ActionStatus::Running).await),
        }
    }

    async fn mark_pending_retry(&self, id: i64, error: &str) -> StorageResult<ActionRecord> {
        let query = format!(
            r#"
            UPDATE actions
            SET status = 'pending', attempts = attempts + 1, last_error = $2, updated_at = $3
            WHERE id = $1 AND status = 'running'
            RETURNING {ACTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(error)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match row {
            Some(row) => Self::row_to_action(&row),
            None => Err(self.cas_miss(id, ActionStatus::Running).await),
        }
    }

    async fn cancel_action(&self, id: i64) -> StorageResult<ActionRecord> {
        let query = format!(
            r#"
            UPDATE actions
            SET status = 'cancelled', updated_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {ACTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match row {
            Some(row) => Self::row_to_action(&row),
            None => Err(self.cas_miss(id, ActionStatus::Pending).await),
        }
    }

    async fn get_action(&self, id: i64) -> StorageResult<Option<ActionRecord>> {
        let query = format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        row.as_ref().map(Self::row_to_action).transpose()
    }

    async fn list_actions(&self, filter: ActionFilter) -> StorageResult<Vec<ActionRecord>> {
        let query = format!(
            r#"
            SELECT {ACTION_COLUMNS}
            FROM actions
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR target = $2)
            ORDER BY started_at DESC, id DESC
            LIMIT $3
            "#
        );
        let rows = sqlx::query(&query)
            .bind(filter.status.map(|s| s.as_str().to_string()))
            .bind(filter.target.clone())
            .bind(filter.effective_limit() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.iter().map(Self::row_to_action).collect()
    }

    async fn count_by_status(&self, status: ActionStatus) -> StorageResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM actions WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        let count: i64 = row
            .try_get("count")
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(count as u64)
    }
}

impl Storage for PostgresStorage {}
