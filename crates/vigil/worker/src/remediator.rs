//! HTTP client for the external remediator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use vigil_types::{Params, Severity, TaskEnvelope};

const USER_AGENT: &str = concat!("vigil-control-plane/", env!("CARGO_PKG_VERSION"));

/// Classified result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The remediator executed the action.
    Success,

    /// The request will never succeed; the action fails terminally.
    Permanent(String),

    /// The failure may clear; the action is eligible for retry.
    Transient(String),
}

/// Request body sent to the remediator.
#[derive(Debug, Serialize)]
struct RemediationRequest<'a> {
    task_id: &'a str,
    action_id: i64,
    target: &'a str,
    action: &'a str,
    severity: Severity,
    params: &'a Params,
    attempt: u32,
}

/// Response body expected from the remediator.
#[derive(Debug, Deserialize)]
struct RemediationResponse {
    status: String,
    #[serde(default)]
    detail: Option<String>,
}

/// Client driving the external remediator endpoint.
#[derive(Debug, Clone)]
pub struct RemediatorClient {
    client: reqwest::Client,
    url: String,
}

impl RemediatorClient {
    /// Build a client with the per-request `execution_timeout`.
    pub fn new(url: impl Into<String>, execution_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(execution_timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }

    /// POST the envelope and classify the outcome per the dispatch
    /// protocol. Never panics; every failure mode maps to an outcome.
    pub async fn dispatch(&self, envelope: &TaskEnvelope) -> DispatchOutcome {
        let request = RemediationRequest {
            task_id: &envelope.task_id,
            action_id: envelope.action_id,
            target: &envelope.target,
            action: &envelope.action,
            severity: envelope.severity,
            params: &envelope.params,
            attempt: envelope.attempt,
        };

        debug!(
            task_id = %envelope.task_id,
            action_id = envelope.action_id,
            target = %envelope.target,
            attempt = envelope.attempt,
            "Dispatching to remediator"
        );

        let response = self
            .client
            .post(&self.url)
            .header("Idempotency-Key", &envelope.task_id)
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                return DispatchOutcome::Transient("request timed out".to_string());
            }
            Err(err) => {
                return DispatchOutcome::Transient(format!("request error: {err}"));
            }
        };

        let status = response.status().as_u16();
        match status {
            200..=299 => match response.json::<RemediationResponse>().await {
                Ok(body) if body.status == "success" => DispatchOutcome::Success,
                Ok(body) => DispatchOutcome::Permanent(format!(
                    "remediator reported {}: {}",
                    body.status,
                    body.detail.unwrap_or_default()
                )),
                Err(err) => {
                    error!(task_id = %envelope.task_id, %err, "Unparseable remediator response");
                    DispatchOutcome::Permanent(format!("unparseable response: {err}"))
                }
            },
            408 | 425 | 429 => DispatchOutcome::Transient(format!("status {status}")),
            400..=499 => DispatchOutcome::Permanent(format!("status {status}")),
            501 => DispatchOutcome::Permanent("status 501".to_string()),
            _ => DispatchOutcome::Transient(format!("status {status}")),
        }
    }
}
