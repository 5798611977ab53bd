//! Webhook Delivery: at-least-once POST of the terminal envelope. Delivery
//! failure after exhausted retries is recorded but never changes the
//! orchestration's own status (§7).

use crate::aggregator::WebhookEnvelope;
use crate::error::ControlPlaneError;
use crate::resilience::BackoffPolicy;

pub struct WebhookDelivery {
    client: reqwest::Client,
    backoff: BackoffPolicy,
    max_retries: u32,
}

impl WebhookDelivery {
    pub fn new(backoff: BackoffPolicy, max_retries: u32) -> Self {
        Self { client: reqwest::Client::new(), backoff, max_retries }
    }

    #[tracing::instrument(skip(self, envelope))]
    pub async fn deliver(&self, url: &str, envelope: &WebhookEnvelope) -> Result<(), ControlPlaneError> {
        let mut attempt = 0;
        loop {
            let outcome = self.client.post(url).json(envelope).send().await;
            match outcome {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) if response.status().is_client_error() => {
                    return Err(ControlPlaneError::Internal {
                        message: format!("webhook delivery rejected permanently with {}", response.status()),
                    });
                }
                Ok(response) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(ControlPlaneError::Internal {
                            message: format!("webhook delivery exhausted retries at {}", response.status()),
                        });
                    }
                    tracing::warn!(attempt, status = %response.status(), "retrying webhook delivery");
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(ControlPlaneError::Internal {
                            message: format!("webhook delivery exhausted retries on transport error: {e}"),
                        });
                    }
                    tracing::warn!(attempt, error = %e, "retrying webhook delivery after transport error");
                }
            }
            tokio::time::sleep(self.backoff.delay_for(attempt - 1)).await;
        }
    }
}
