//! Storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vigil_types::{ActionRecord, ActionStatus, MetricSample};

use crate::error::StorageResult;

/// Hard cap on list query sizes.
pub const MAX_LIST_LIMIT: usize = 500;

/// Default list query size.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Filter for action list queries. Results are newest first.
#[derive(Debug, Clone)]
pub struct ActionFilter {
    pub limit: usize,
    pub status: Option<ActionStatus>,
    pub target: Option<String>,
}

impl Default for ActionFilter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            status: None,
            target: None,
        }
    }
}

impl ActionFilter {
    /// Limit clamped into `1..=MAX_LIST_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIST_LIMIT)
    }
}

/// Persistence of metric samples.
#[async_trait]
pub trait MetricStorage: Send + Sync {
    /// Store a sample and return its assigned id.
    async fn insert_metric(&self, sample: MetricSample) -> StorageResult<i64>;

    /// Samples received at or after `since`, newest first, bounded by
    /// `limit`.
    async fn recent_metrics(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<MetricSample>>;
}

/// Persistence of action records with compare-and-set transitions.
///
/// Every `mark_*` operation checks the record's current status and only
/// applies the transition when it matches the lifecycle DAG edge; a
/// mismatch is a [`StorageError::Conflict`]. Ids are assigned
/// monotonically and never reused.
///
/// [`StorageError::Conflict`]: crate::StorageError::Conflict
#[async_trait]
pub trait ActionStorage: Send + Sync {
    /// Persist a new record and return its assigned id.
    async fn create_action(&self, record: ActionRecord) -> StorageResult<i64>;

    /// Claim a pending record for execution: CAS pending → running.
    ///
    /// Exactly one concurrent caller wins; the rest observe `Conflict`.
    async fn claim_action(&self, id: i64) -> StorageResult<ActionRecord>;

    /// CAS running → completed.
    async fn mark_completed(&self, id: i64, details: Option<String>) -> StorageResult<ActionRecord>;

    /// CAS running → failed, recording `error`.
    async fn mark_failed(&self, id: i64, error: &str) -> StorageResult<ActionRecord>;

    /// CAS running → pending for a retry, incrementing `attempts` and
    /// recording the transient `error`.
    async fn mark_pending_retry(&self, id: i64, error: &str) -> StorageResult<ActionRecord>;

    /// CAS pending → cancelled.
    async fn cancel_action(&self, id: i64) -> StorageResult<ActionRecord>;

    /// Fetch one record.
    async fn get_action(&self, id: i64) -> StorageResult<Option<ActionRecord>>;

    /// List records matching `filter`, newest first.
    async fn list_actions(&self, filter: ActionFilter) -> StorageResult<Vec<ActionRecord>>;

    /// Number of records currently in `status`.
    async fn count_by_status(&self, status: ActionStatus) -> StorageResult<u64>;
}

/// Combined storage surface the daemon wires together.
pub trait Storage: MetricStorage + ActionStorage {}
