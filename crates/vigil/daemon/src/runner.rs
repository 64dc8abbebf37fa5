//! Scheduled policy re-evaluation.
//!
//! A single periodic task drains recent samples from storage, groups
//! them by target, and runs the engine once per group. Ticks run to
//! completion before the next is scheduled, so overruns coalesce into
//! at most one pending tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vigil_policy::PolicyEngine;
use vigil_storage::MetricStorage;
use vigil_worker::RemediationProducer;

use crate::config::VigilConfig;

/// Observable runner state.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerStatus {
    pub enabled: bool,
    pub running: bool,
    pub interval_seconds: u64,
    pub batch_size: usize,
}

/// Summary of one evaluation tick.
#[derive(Debug, Default)]
pub struct TickSummary {
    pub samples: usize,
    pub groups: usize,
    pub violations: usize,
    pub intents_submitted: usize,
    pub errors: usize,
}

/// Periodic evaluator over recently ingested samples.
pub struct PolicyRunner {
    engine: Arc<PolicyEngine>,
    storage: Arc<dyn MetricStorage>,
    producer: Arc<RemediationProducer>,
    enabled: bool,
    interval_seconds: u64,
    batch_size: usize,
    running: AtomicBool,
    last_tick: Mutex<DateTime<Utc>>,
}

impl PolicyRunner {
    pub fn new(
        config: &VigilConfig,
        engine: Arc<PolicyEngine>,
        storage: Arc<dyn MetricStorage>,
        producer: Arc<RemediationProducer>,
    ) -> Self {
        Self {
            engine,
            storage,
            producer,
            enabled: config.runner_enabled,
            interval_seconds: config.runner_interval_seconds,
            batch_size: config.runner_batch_size,
            running: AtomicBool::new(false),
            // The first tick looks back one full interval.
            last_tick: Mutex::new(
                Utc::now() - chrono::Duration::seconds(config.runner_interval_seconds as i64),
            ),
        }
    }

    /// Spawn the periodic loop. A disabled runner never starts.
    pub fn start(self: &Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        if !self.enabled {
            info!("Policy runner disabled, skipping startup");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                interval_seconds = runner.interval_seconds,
                batch_size = runner.batch_size,
                "Policy runner started"
            );
            let interval = std::time::Duration::from_secs(runner.interval_seconds);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
                let summary = runner.run_once().await;
                debug!(
                    samples = summary.samples,
                    groups = summary.groups,
                    violations = summary.violations,
                    intents = summary.intents_submitted,
                    errors = summary.errors,
                    "Policy evaluation tick completed"
                );
            }
            runner.running.store(false, Ordering::SeqCst);
            info!("Policy runner stopped");
        });
    }

    /// Run one evaluation tick over samples received since the last one.
    pub async fn run_once(&self) -> TickSummary {
        let mut summary = TickSummary::default();
        let since = {
            let mut last_tick = self.last_tick.lock().unwrap();
            let since = *last_tick;
            *last_tick = Utc::now();
            since
        };

        let samples = match self.storage.recent_metrics(since, self.batch_size).await {
            Ok(samples) => samples,
            Err(err) => {
                error!(%err, "Failed to fetch recent metrics");
                summary.errors += 1;
                return summary;
            }
        };
        if samples.is_empty() {
            return summary;
        }
        summary.samples = samples.len();

        // Group samples by their target tag; untargeted samples form one
        // shared group. Samples arrive newest first, so the first value
        // seen for a metric name is the latest.
        let mut groups: HashMap<Option<String>, std::collections::BTreeMap<String, f64>> =
            HashMap::new();
        for sample in &samples {
            let group = groups
                .entry(sample.target().map(str::to_string))
                .or_default();
            group.entry(sample.name.clone()).or_insert(sample.value);
        }
        summary.groups = groups.len();

        for (target, metrics) in &groups {
            let evaluation = self.engine.evaluate(metrics, target.as_deref());
            summary.violations += evaluation.violations.len();

            if !evaluation.violations.is_empty() {
                warn!(
                    target = target.as_deref().unwrap_or("all"),
                    violations = evaluation.violations.len(),
                    "Scheduled evaluation detected violations"
                );
            }

            for intent in &evaluation.intents {
                match self.producer.submit(intent).await {
                    Ok(_) => summary.intents_submitted += 1,
                    Err(err) => {
                        error!(
                            policy = %intent.policy_name,
                            target = %intent.target,
                            %err,
                            "Failed to submit remediation intent"
                        );
                        summary.errors += 1;
                    }
                }
            }
        }

        summary
    }

    /// Point-in-time status.
    pub fn status(&self) -> RunnerStatus {
        RunnerStatus {
            enabled: self.enabled,
            running: self.running.load(Ordering::SeqCst),
            interval_seconds: self.interval_seconds,
            batch_size: self.batch_size,
        }
    }
}
