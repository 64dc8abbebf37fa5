//! In-memory storage for development and testing.
//!
//! Implements the same compare-and-set discipline as the Postgres backend
//! under a single mutex per table. Not suitable for production use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vigil_types::{ActionRecord, ActionStatus, MetricSample};

use crate::error::{StorageError, StorageResult};
use crate::traits::{ActionFilter, ActionStorage, MetricStorage, Storage};

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    metrics: Mutex<Vec<MetricSample>>,
    actions: Mutex<HashMap<i64, ActionRecord>>,
    next_metric_id: AtomicI64,
    next_action_id: AtomicI64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(Vec::new()),
            actions: Mutex::new(HashMap::new()),
            next_metric_id: AtomicI64::new(1),
            next_action_id: AtomicI64::new(1),
        }
    }

    fn transition(
        &self,
        id: i64,
        expected: ActionStatus,
        next: ActionStatus,
        apply: impl FnOnce(&mut ActionRecord),
    ) -> StorageResult<ActionRecord> {
        let mut actions = self.actions.lock().unwrap();
        let record = actions
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("action {id}")))?;
        if record.status != expected {
            return Err(StorageError::Conflict(format!(
                "action {id} is {}, expected {expected}",
                record.status
            )));
        }
        record.status = next;
        record.updated_at = Utc::now();
        apply(record);
        Ok(record.clone())
    }
}

#[async_trait]
impl MetricStorage for MemoryStorage {
    async fn insert_metric(&self, mut sample: MetricSample) -> StorageResult<i64> {
        let id = self.next_metric_id.fetch_add(1, Ordering::SeqCst);
        sample.id = id;
        self.metrics.lock().unwrap().push(sample);
        Ok(id)
    }

    async fn recent_metrics(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<MetricSample>> {
        let metrics = self.metrics.lock().unwrap();
        let mut recent: Vec<MetricSample> = metrics
            .iter()
            .filter(|m| m.timestamp >= since)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);
        Ok(recent)
    }
}

#[async_trait]
impl ActionStorage for MemoryStorage {
    async fn create_action(&self, mut record: ActionRecord) -> StorageResult<i64> {
        let id = self.next_action_id.fetch_add(1, Ordering::SeqCst);
        record.id = id;
        self.actions.lock().unwrap().insert(id, record);
        Ok(id)
    }

    async fn claim_action(&self, id: i64) -> StorageResult<ActionRecord> {
        self.transition(id, ActionStatus::Pending, ActionStatus::Running, |_| {})
    }

    async fn mark_completed(&self, id: i64, details: Option<String>) -> StorageResult<ActionRecord> {
        self.transition(id, ActionStatus::Running, ActionStatus::Completed, |r| {
            if details.is_some() {
                r.details = details;
            }
            r.last_error = None;
        })
    }

    async fn mark_failed(&self, id: i64, error: &str) -> StorageResult<ActionRecord> {
        self.transition(id, ActionStatus::Running, ActionStatus::Failed, |r| {
            r.last_error = Some(error.to_string());
        })
    }

    async fn mark_pending_retry(&self, id: i64, error: &str) -> StorageResult<ActionRecord> {
        self.transition(id, ActionStatus::Running, ActionStatus::Pending, |r| {
            r.attempts += 1;
            r.last_error = Some(error.to_string());
        })
    }

    async fn cancel_action(&self, id: i64) -> StorageResult<ActionRecord> {
        self.transition(id, ActionStatus::Pending, ActionStatus::Cancelled, |_| {})
    }

    async fn get_action(&self, id: i64) -> StorageResult<Option<ActionRecord>> {
        Ok(self.actions.lock().unwrap().get(&id).cloned())
    }

    async fn list_actions(&self, filter: ActionFilter) -> StorageResult<Vec<ActionRecord>> {
        let actions = self.actions.lock().unwrap();
        let mut matched: Vec<ActionRecord> = actions
            .values()
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| {
                filter
                    .target
                    .as_deref()
                    .map_or(true, |t| a.target == t)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        matched.truncate(filter.effective_limit());
        Ok(matched)
    }

    async fn count_by_status(&self, status: ActionStatus) -> StorageResult<u64> {
        let actions = self.actions.lock().unwrap();
        Ok(actions.values().filter(|a| a.status == status).count() as u64)
    }
}

impl Storage for MemoryStorage {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn sample(name: &str, value: f64) -> MetricSample {
        MetricSample::new(name, value, BTreeMap::new()).unwrap()
    }

    #[tokio::test]
    async fn test_metric_ids_are_monotonic() {
        let storage = MemoryStorage::new();
        let a = storage.insert_metric(sample("cpu", 1.0)).await.unwrap();
        let b = storage.insert_metric(sample("cpu", 2.0)).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_recent_metrics_filters_and_orders() {
        let storage = MemoryStorage::new();
        let cutoff = Utc::now();

        let mut old = sample("cpu", 1.0);
        old.timestamp = cutoff - chrono::Duration::minutes(10);
        storage.insert_metric(old).await.unwrap();
        storage.insert_metric(sample("cpu", 2.0)).await.unwrap();
        storage.insert_metric(sample("mem", 3.0)).await.unwrap();

        let recent = storage
            .recent_metrics(cutoff - chrono::Duration::minutes(1), 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp >= recent[1].timestamp);
    }

    #[tokio::test]
    async fn test_claim_wins_exactly_once() {
        let storage = Arc::new(MemoryStorage::new());
        let id = storage
            .create_action(ActionRecord::pending("web-1", "restart"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(
                async move { storage.claim_action(id).await },
            ));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(
            storage.get_action(id).await.unwrap().unwrap().status,
            ActionStatus::Running
        );
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let storage = MemoryStorage::new();
        let id = storage
            .create_action(ActionRecord::pending("web-1", "restart"))
            .await
            .unwrap();

        storage.claim_action(id).await.unwrap();
        let done = storage
            .mark_completed(id, Some("restarted".to_string()))
            .await
            .unwrap();
        assert_eq!(done.status, ActionStatus::Completed);
        assert_eq!(done.details.as_deref(), Some("restarted"));

        // Terminal: any further transition conflicts.
        assert!(matches!(
            storage.mark_failed(id, "late").await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_retry_increments_attempts() {
        let storage = MemoryStorage::new();
        let id = storage
            .create_action(ActionRecord::pending("web-1", "restart"))
            .await
            .unwrap();

        storage.claim_action(id).await.unwrap();
        let retried = storage.mark_pending_retry(id, "503").await.unwrap();
        assert_eq!(retried.status, ActionStatus::Pending);
        assert_eq!(retried.attempts, 2);
        assert_eq!(retried.last_error.as_deref(), Some("503"));

        // Claimable again after the retry transition.
        storage.claim_action(id).await.unwrap();
        let retried = storage.mark_pending_retry(id, "timeout").await.unwrap();
        assert_eq!(retried.attempts, 3);
    }

    #[tokio::test]
    async fn test_cancel_only_from_pending() {
        let storage = MemoryStorage::new();
        let id = storage
            .create_action(ActionRecord::pending("web-1", "restart"))
            .await
            .unwrap();

        storage.claim_action(id).await.unwrap();
        assert!(matches!(
            storage.cancel_action(id).await,
            Err(StorageError::Conflict(_))
        ));

        let id2 = storage
            .create_action(ActionRecord::pending("web-2", "restart"))
            .await
            .unwrap();
        let cancelled = storage.cancel_action(id2).await.unwrap();
        assert_eq!(cancelled.status, ActionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_list_actions_filters() {
        let storage = MemoryStorage::new();
        for target in ["web-1", "web-2", "db-1"] {
            storage
                .create_action(ActionRecord::pending(target, "restart"))
                .await
                .unwrap();
        }
        let id = storage
            .create_action(ActionRecord::pending("web-1", "scale-up"))
            .await
            .unwrap();
        storage.claim_action(id).await.unwrap();

        let all = storage.list_actions(ActionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 4);

        let pending = storage
            .list_actions(ActionFilter {
                status: Some(ActionStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 3);

        let web1 = storage
            .list_actions(ActionFilter {
                target: Some("web-1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(web1.len(), 2);

        assert_eq!(
            storage.count_by_status(ActionStatus::Running).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_missing_action_is_not_found() {
        let storage = MemoryStorage::new();
        assert!(storage.get_action(42).await.unwrap().is_none());
        assert!(matches!(
            storage.claim_action(42).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
