//! Prometheus metrics for the control plane.

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use vigil_queue::QueueStats;
use vigil_worker::PoolStatus;

/// Central metrics registry with the `vigil` prefix.
///
/// Request, ingest, evaluation and action series are incremented inline
/// by the handlers that own those events. Queue and worker series mirror
/// the queue's and pool's own counters and are refreshed at scrape time,
/// so they are gauges here even though the underlying values are
/// monotonic.
pub struct VigilMetrics {
    registry: Registry,

    /// Total HTTP requests served.
    pub requests_total: IntCounter,

    /// Total metric samples ingested.
    pub ingest_total: IntCounter,

    /// Policy evaluations by policy name and result.
    pub policy_evaluation_total: IntCounterVec,

    /// Actions recorded, labelled by target, action and initial status.
    pub actions_total: IntCounterVec,

    /// Queue operations by kind. Set at scrape time.
    pub queue_operations_total: IntGaugeVec,

    /// Current queue depth. Set at scrape time.
    pub queue_length: IntGauge,

    /// Worker task outcomes. Set at scrape time from pool counters.
    pub worker_tasks_total: IntGaugeVec,

    /// Workers currently executing a task. Set at scrape time.
    pub worker_active: IntGauge,
}

impl VigilMetrics {
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("vigil".to_string()), None)
            .expect("metrics registry construction cannot fail with a static prefix");

        let requests_total =
            IntCounter::with_opts(Opts::new("requests_total", "Total HTTP requests served"))
                .expect("valid metric definition");
        let ingest_total =
            IntCounter::with_opts(Opts::new("ingest_total", "Total metric samples ingested"))
                .expect("valid metric definition");
        let policy_evaluation_total = IntCounterVec::new(
            Opts::new("policy_evaluation_total", "Policy evaluations by result"),
            &["policy", "result"],
        )
        .expect("valid metric definition");
        let actions_total = IntCounterVec::new(
            Opts::new("actions_total", "Actions recorded"),
            &["target", "action", "status"],
        )
        .expect("valid metric definition");
        let queue_operations_total = IntGaugeVec::new(
            Opts::new("queue_operations_total", "Queue operations by kind"),
            &["op"],
        )
        .expect("valid metric definition");
        let queue_length = IntGauge::with_opts(Opts::new("queue_length", "Current queue depth"))
            .expect("valid metric definition");
        let worker_tasks_total = IntGaugeVec::new(
            Opts::new("worker_tasks_total", "Worker task outcomes"),
            &["status"],
        )
        .expect("valid metric definition");
        let worker_active =
            IntGauge::with_opts(Opts::new("worker_active", "Workers currently executing"))
                .expect("valid metric definition");

        for collector in [
            Box::new(requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(ingest_total.clone()),
            Box::new(policy_evaluation_total.clone()),
            Box::new(actions_total.clone()),
            Box::new(queue_operations_total.clone()),
            Box::new(queue_length.clone()),
            Box::new(worker_tasks_total.clone()),
            Box::new(worker_active.clone()),
        ] {
            registry
                .register(collector)
                .expect("metric registration cannot collide within one registry");
        }

        Self {
            registry,
            requests_total,
            ingest_total,
            policy_evaluation_total,
            actions_total,
            queue_operations_total,
            queue_length,
            worker_tasks_total,
            worker_active,
        }
    }

    /// Record one evaluation pass outcome for each fired policy.
    pub fn record_evaluation(&self, policy: &str, fired: bool) {
        let result = if fired { "violation" } else { "pass" };
        self.policy_evaluation_total
            .with_label_values(&[policy, result])
            .inc();
    }

    /// Refresh queue series from a counter snapshot.
    pub fn observe_queue(&self, stats: &QueueStats) {
        self.queue_length.set(stats.queue_length as i64);
        self.queue_operations_total
            .with_label_values(&["enqueue"])
            .set(stats.tasks_enqueued as i64);
        self.queue_operations_total
            .with_label_values(&["dequeue"])
            .set(stats.tasks_dequeued as i64);
        self.queue_operations_total
            .with_label_values(&["complete"])
            .set(stats.tasks_completed as i64);
        self.queue_operations_total
            .with_label_values(&["fail"])
            .set(stats.tasks_failed as i64);
    }

    /// Refresh worker series from a pool snapshot.
    pub fn observe_pool(&self, status: &PoolStatus) {
        self.worker_active.set(status.active_workers as i64);
        self.worker_tasks_total
            .with_label_values(&["completed"])
            .set(status.tasks_processed as i64);
        self.worker_tasks_total
            .with_label_values(&["failed"])
            .set(status.tasks_failed as i64);
    }

    /// Export all metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for VigilMetrics {
    fn default() -> Self {
        Self::new()
    }
}
