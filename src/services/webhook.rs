use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use crate::dispatch::GenerationPayload;
use crate::errors::dispatch::{DispatchError, DispatchResult};

/// External image-generation service. Results come back through the jobs table,
/// so a call only reports whether the request was accepted.
#[async_trait]
pub trait GenerationWebhook: Send + Sync {
    async fn submit(&self, payload: &GenerationPayload) -> DispatchResult<()>;
}

#[derive(Clone)]
pub struct HttpWebhook {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl HttpWebhook {
    pub fn new(client: Client, url: String, timeout_secs: u64) -> Self {
        Self {
            client,
            url,
            timeout_secs,
        }
    }
}

#[async_trait]
impl GenerationWebhook for HttpWebhook {
    async fn submit(&self, payload: &GenerationPayload) -> DispatchResult<()> {
        tracing::debug!("Posting generation request {}", payload.id);

        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout(self.timeout_secs)
                } else {
                    DispatchError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Status(status.as_u16()));
        }
        Ok(())
    }
}
