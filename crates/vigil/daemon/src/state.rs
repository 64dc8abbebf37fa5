//! Shared application state for the REST API.

use std::sync::Arc;

use vigil_policy::PolicyEngine;
use vigil_queue::RemediationQueue;
use vigil_storage::Storage;
use vigil_worker::{RemediationProducer, WorkerPool};

use crate::config::VigilConfig;
use crate::metrics::VigilMetrics;
use crate::runner::PolicyRunner;

/// Dependencies shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<VigilConfig>,
    pub engine: Arc<PolicyEngine>,
    pub storage: Arc<dyn Storage>,
    pub queue: Arc<dyn RemediationQueue>,
    pub producer: Arc<RemediationProducer>,
    pub pool: Arc<WorkerPool>,
    pub runner: Arc<PolicyRunner>,
    pub metrics: Arc<VigilMetrics>,
}
