//! Process wiring and lifecycle.
//!
//! Construction happens once at startup: backends are selected from the
//! config, dependencies are injected explicitly, and teardown signals
//! every background task before the process exits.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use vigil_policy::{load_policy_file, CooldownRegistry, PolicyEngine, PolicyRegistry};
use vigil_queue::{MemoryQueue, PostgresQueue, RemediationQueue};
use vigil_resilience::{BreakerConfig, CircuitBreaker};
use vigil_storage::{ActionStorage, MemoryStorage, MetricStorage, PostgresStorage, Storage};
use vigil_worker::{RemediationProducer, RemediatorClient, RetryPolicy, WorkerConfig, WorkerPool};

use crate::config::VigilConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::metrics::VigilMetrics;
use crate::runner::PolicyRunner;
use crate::state::AppState;

/// A fully wired daemon ready to serve.
pub struct Daemon {
    pub state: AppState,
    shutdown_tx: watch::Sender<bool>,
}

/// One concrete storage backend behind each trait surface.
fn wire_storage<S: Storage + 'static>(
    storage: Arc<S>,
) -> (
    Arc<dyn Storage>,
    Arc<dyn ActionStorage>,
    Arc<dyn MetricStorage>,
) {
    (
        Arc::clone(&storage) as Arc<dyn Storage>,
        Arc::clone(&storage) as Arc<dyn ActionStorage>,
        storage,
    )
}

impl Daemon {
    /// Build every component from the config. No background work starts
    /// here; `run` owns that.
    pub async fn build(config: VigilConfig) -> DaemonResult<Self> {
        let config = Arc::new(config);

        let (storage, action_storage, metric_storage) = if config.memory_storage() {
            info!("Using in-memory storage backend");
            wire_storage(Arc::new(MemoryStorage::new()))
        } else {
            info!(url = %config.database_url, "Connecting to PostgreSQL storage");
            wire_storage(Arc::new(
                PostgresStorage::new(&config.database_url, 10, 30).await?,
            ))
        };

        let queue: Arc<dyn RemediationQueue> = if config.memory_queue() {
            info!("Using in-memory queue backend");
            Arc::new(MemoryQueue::new())
        } else {
            info!(url = %config.queue_url, "Connecting to PostgreSQL queue");
            Arc::new(PostgresQueue::new(&config.queue_url, 10).await?)
        };

        let registry = Arc::new(PolicyRegistry::new());
        if let Some(path) = &config.policy_file {
            match load_policy_file(path).and_then(|candidates| registry.reload(candidates)) {
                Ok(count) => info!(policies = count, path = %path.display(), "Policies loaded"),
                Err(err) => {
                    warn!(path = %path.display(), %err, "Failed to load policy file, starting empty")
                }
            }
        }

        let engine = Arc::new(PolicyEngine::new(registry, Arc::new(CooldownRegistry::new())));

        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            window: std::time::Duration::from_secs(config.breaker_window_seconds),
            cooldown: std::time::Duration::from_secs(config.breaker_cooldown_seconds),
        }));

        let remediator = RemediatorClient::new(&config.remediator_url, config.execution_timeout());

        let producer = Arc::new(RemediationProducer::new(
            Arc::clone(&action_storage),
            Arc::clone(&queue),
        ));

        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&action_storage),
            Arc::clone(&queue),
            breaker,
            remediator,
            WorkerConfig {
                max_concurrent: config.max_concurrent_workers,
                queue_poll_timeout: config.queue_poll_timeout(),
                retry: RetryPolicy {
                    max_attempts: config.retry_max_attempts,
                    base_delay: std::time::Duration::from_millis(config.retry_base_delay_ms),
                    max_delay: std::time::Duration::from_millis(config.retry_max_delay_ms),
                    exponential_base: config.retry_exponential_base,
                },
                shutdown_timeout: config.shutdown_timeout(),
            },
        ));

        let runner = Arc::new(PolicyRunner::new(
            &config,
            Arc::clone(&engine),
            metric_storage,
            Arc::clone(&producer),
        ));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            state: AppState {
                config,
                engine,
                storage,
                queue,
                producer,
                pool,
                runner,
                metrics: Arc::new(VigilMetrics::new()),
            },
            shutdown_tx,
        })
    }

    /// Start background work and serve HTTP until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> DaemonResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let state = self.state.clone();

        state
            .pool
            .start()
            .map_err(|e| DaemonError::Server(e.to_string()))?;
        state.runner.start(self.shutdown_tx.subscribe());

        let listener = tokio::net::TcpListener::bind(&state.config.listen_addr)
            .await
            .map_err(|e| {
                DaemonError::Server(format!("cannot bind {}: {e}", state.config.listen_addr))
            })?;
        info!(listen = %state.config.listen_addr, "Vigil daemon listening");

        let router = crate::api::create_router(state.clone());
        let shutdown_tx = self.shutdown_tx.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            })
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        // HTTP is down; drain in-flight dispatches before exit.
        state.pool.shutdown().await;
        info!("Vigil daemon stopped");
        Ok(())
    }
}
