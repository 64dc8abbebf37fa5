//! The worker pool.
//!
//! `max_concurrent` workers block on the queue and apply the dispatch
//! protocol: claim the action (exactly one winner), honor the circuit
//! breaker, call the remediator, and walk the record to a terminal state
//! or back to pending for a retry. Failures are isolated per task; a
//! worker never dies because one envelope went wrong.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vigil_queue::RemediationQueue;
use vigil_resilience::CircuitBreaker;
use vigil_storage::{ActionStorage, StorageError};
use vigil_types::TaskEnvelope;

use crate::error::WorkerError;
use crate::remediator::{DispatchOutcome, RemediatorClient};
use crate::retry::RetryPolicy;

/// Worker pool tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    pub max_concurrent: usize,

    /// How long one dequeue blocks before looping.
    pub queue_poll_timeout: Duration,

    /// Retry policy for transient dispatch failures.
    pub retry: RetryPolicy,

    /// How long shutdown waits for in-flight dispatches.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            queue_poll_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Observable pool state.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub running: bool,
    pub max_workers: usize,
    pub active_workers: usize,
    pub tasks_processed: u64,
    pub tasks_failed: u64,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct PoolState {
    running: AtomicBool,
    active: AtomicUsize,
    tasks_processed: AtomicU64,
    tasks_failed: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

/// Shared context cloned into every worker task.
struct WorkerContext {
    storage: Arc<dyn ActionStorage>,
    queue: Arc<dyn RemediationQueue>,
    breaker: Arc<CircuitBreaker>,
    remediator: RemediatorClient,
    retry: RetryPolicy,
    state: Arc<PoolState>,
}

/// Pool of queue consumers dispatching to the remediator.
pub struct WorkerPool {
    context: Arc<WorkerContext>,
    config: WorkerConfig,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        storage: Arc<dyn ActionStorage>,
        queue: Arc<dyn RemediationQueue>,
        breaker: Arc<CircuitBreaker>,
        remediator: RemediatorClient,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            context: Arc::new(WorkerContext {
                storage,
                queue,
                breaker,
                remediator,
                retry: config.retry.clone(),
                state: Arc::new(PoolState::default()),
            }),
            config,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the workers. Idempotent start is an error.
    pub fn start(&self) -> Result<(), WorkerError> {
        let state = &self.context.state;
        if state.running.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyRunning);
        }
        *state.started_at.lock().unwrap() = Some(Utc::now());

        let mut handles = self.handles.lock().unwrap();
        for worker_id in 0..self.config.max_concurrent {
            let context = Arc::clone(&self.context);
            let poll_timeout = self.config.queue_poll_timeout;
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                context,
                poll_timeout,
                shutdown_rx,
            )));
        }

        info!(
            workers = self.config.max_concurrent,
            poll_timeout_secs = self.config.queue_poll_timeout.as_secs(),
            "Worker pool started"
        );
        Ok(())
    }

    /// Signal workers and wait up to `shutdown_timeout` for in-flight
    /// dispatches to reach a terminal action state. Envelopes not yet
    /// claimed stay in the queue.
    pub async fn shutdown(&self) {
        if !self.context.state.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock().unwrap());
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain)
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Worker pool shutdown timed out with dispatches in flight"
            );
        }

        info!(
            tasks_processed = self.context.state.tasks_processed.load(Ordering::SeqCst),
            tasks_failed = self.context.state.tasks_failed.load(Ordering::SeqCst),
            "Worker pool stopped"
        );
    }

    /// Point-in-time status snapshot.
    pub fn status(&self) -> PoolStatus {
        let state = &self.context.state;
        PoolStatus {
            running: state.running.load(Ordering::SeqCst),
            max_workers: self.config.max_concurrent,
            active_workers: state.active.load(Ordering::SeqCst),
            tasks_processed: state.tasks_processed.load(Ordering::SeqCst),
            tasks_failed: state.tasks_failed.load(Ordering::SeqCst),
            started_at: *state.started_at.lock().unwrap(),
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    context: Arc<WorkerContext>,
    poll_timeout: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker_id, "Worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let envelope = tokio::select! {
            _ = shutdown_rx.changed() => break,
            dequeued = context.queue.dequeue(poll_timeout) => match dequeued {
                Ok(envelope) => envelope,
                Err(err) => {
                    error!(worker_id, %err, "Queue dequeue failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    None
                }
            },
        };
        if let Some(envelope) = envelope {
            context.state.active.fetch_add(1, Ordering::SeqCst);
            process_envelope(worker_id, &context, envelope, &mut shutdown_rx).await;
            context.state.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
    debug!(worker_id, "Worker stopped");
}

/// Apply the dispatch protocol to one envelope.
async fn process_envelope(
    worker_id: usize,
    context: &WorkerContext,
    envelope: TaskEnvelope,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let action_id = envelope.action_id;

    // Claim is the pending → running CAS: exactly one delivery of this
    // action may proceed, and the transition lands before any remote call.
    match context.storage.claim_action(action_id).await {
        Ok(_) => {}
        Err(StorageError::Conflict(reason)) => {
            debug!(worker_id, action_id, %reason, "Duplicate delivery discarded");
            return;
        }
        Err(err) => {
            error!(worker_id, action_id, %err, "Failed to claim action");
            return;
        }
    }

    if context.breaker.is_open(&envelope.target) {
        warn!(
            worker_id,
            action_id,
            target = %envelope.target,
            "Circuit open, failing action without dispatch"
        );
        fail_action(context, action_id, "circuit_open").await;
        return;
    }

    info!(
        worker_id,
        action_id,
        task_id = %envelope.task_id,
        target = %envelope.target,
        action = %envelope.action,
        attempt = envelope.attempt,
        "Processing remediation task"
    );

    match context.remediator.dispatch(&envelope).await {
        DispatchOutcome::Success => {
            context.breaker.record_success(&envelope.target);
            match context.storage.mark_completed(action_id, None).await {
                Ok(_) => {
                    context.state.tasks_processed.fetch_add(1, Ordering::SeqCst);
                    let _ = context.queue.record_completed(&envelope).await;
                    info!(worker_id, action_id, "Task completed");
                }
                Err(err) => {
                    error!(worker_id, action_id, %err, "Failed to record completion");
                }
            }
        }
        DispatchOutcome::Permanent(reason) => {
            context.breaker.record_failure(&envelope.target);
            warn!(worker_id, action_id, %reason, "Permanent dispatch failure");
            fail_action(context, action_id, &reason).await;
        }
        DispatchOutcome::Transient(reason) => {
            context.breaker.record_failure(&envelope.target);
            if context.retry.retryable(envelope.attempt) {
                retry_envelope(context, envelope, &reason, shutdown_rx).await;
            } else {
                warn!(
                    worker_id,
                    action_id,
                    attempt = envelope.attempt,
                    %reason,
                    "Retry budget exhausted"
                );
                fail_action(context, action_id, &reason).await;
            }
        }
    }
}

/// Walk a running action to `failed` and count it.
async fn fail_action(context: &WorkerContext, action_id: i64, reason: &str) {
    match context.storage.mark_failed(action_id, reason).await {
        Ok(_) => {
            context.state.tasks_failed.fetch_add(1, Ordering::SeqCst);
            let _ = context.queue.record_failed().await;
        }
        Err(err) => {
            error!(action_id, %err, "Failed to record action failure");
        }
    }
}

/// Transition back to pending, back off, and re-enqueue the next attempt.
async fn retry_envelope(
    context: &WorkerContext,
    envelope: TaskEnvelope,
    reason: &str,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let action_id = envelope.action_id;
    if let Err(err) = context.storage.mark_pending_retry(action_id, reason).await {
        error!(action_id, %err, "Failed to transition action for retry");
        return;
    }

    let delay = context.retry.backoff(envelope.attempt);
    info!(
        action_id,
        attempt = envelope.attempt,
        delay_ms = delay.as_millis() as u64,
        reason,
        "Transient failure, retrying after backoff"
    );
    // The backoff is shutdown-interruptible, but the re-enqueue is not:
    // the envelope must not be lost.
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = shutdown_rx.changed() => {}
    }

    if let Err(err) = context.queue.enqueue(envelope.next_attempt()).await {
        error!(action_id, %err, "Failed to re-enqueue retry");
        if context.storage.claim_action(action_id).await.is_ok() {
            let _ = context
                .storage
                .mark_failed(action_id, &format!("re-enqueue failed: {err}"))
                .await;
            context.state.tasks_failed.fetch_add(1, Ordering::SeqCst);
            let _ = context.queue.record_failed().await;
        }
    }
}
