//! Retry/backoff shared by the Task Worker loop and Webhook Delivery.

use crate::error::{ControlPlaneError, Recoverable};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Exponential backoff with jitter. `base ≈ 1s, factor 2, jitter ±20%, cap 30s`
/// for task retries; Webhook Delivery constructs its own instance from its
/// own config section (`base ≈ 2s, cap 60s`).
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
    pub jitter_ratio: f64,
}

impl BackoffPolicy {
    pub fn new(base_delay_ms: u64, factor: f64, max_delay_ms: u64, jitter_ratio: f64) -> Self {
        Self { base_delay_ms, factor, max_delay_ms, jitter_ratio }
    }

    /// Delay before the `attempt`-th retry (0-indexed: `attempt=0` is the
    /// delay before the first retry after the initial try).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.base_delay_ms as f64 * self.factor.powi(attempt as i32);
        let capped = raw.min(self.max_delay_ms as f64);
        let jitter_span = capped * self.jitter_ratio;
        let jittered = if jitter_span > 0.0 {
            let mut rng = rand::thread_rng();
            capped + rng.gen_range(-jitter_span..=jitter_span)
        } else {
            capped
        };
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 1000, factor: 2.0, max_delay_ms: 30_000, jitter_ratio: 0.2 }
    }
}

/// Run `f` until it succeeds, a non-retryable error surfaces, or `max_attempts`
/// total attempts (the initial try plus `max_attempts - 1` retries) have run.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &BackoffPolicy,
    max_attempts: u32,
    mut f: F,
) -> Result<T, ControlPlaneError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, ControlPlaneError>>,
{
    let mut attempt = 0;
    loop {
        match f(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts || !e.is_retryable() {
                    return Err(e);
                }
                tracing::warn!(attempt, error = %e, "retrying after backoff");
                sleep(policy.delay_for(attempt - 1)).await;
            }
        }
    }
}
