use futures::future::join_all;
use serde::Serialize;
use crate::errors::DispatchError;
use crate::services::GenerationWebhook;
use super::payload::GenerationPayload;

/// Result of one webhook call, identified by its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallOutcome {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-call results of a batch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub outcomes: Vec<CallOutcome>,
}

impl DispatchReport {
    pub fn all_succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(CallOutcome::succeeded)
    }

    pub fn succeeded_ids(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| o.id.clone())
            .collect()
    }

    pub fn failures(&self) -> Vec<CallOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded()).cloned().collect()
    }
}

/// Sends every payload concurrently and waits for all of them.
/// A failing call neither cancels nor retries the others.
pub async fn dispatch_all(
    webhook: &dyn GenerationWebhook,
    payloads: &[GenerationPayload],
) -> DispatchReport {
    let calls = payloads.iter().map(|payload| async move {
        let result: Result<(), DispatchError> = webhook.submit(payload).await;
        match result {
            Ok(()) => CallOutcome {
                id: payload.id.clone(),
                error: None,
            },
            Err(e) => {
                tracing::error!("Image generation request {} failed: {}", payload.id, e);
                CallOutcome {
                    id: payload.id.clone(),
                    error: Some(e.to_string()),
                }
            }
        }
    });

    DispatchReport {
        outcomes: join_all(calls).await,
    }
}
