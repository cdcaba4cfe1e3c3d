//! Retry with exponential backoff for remote providers.
//!
//! Network errors, HTTP 429 and HTTP 5xx are transient and retried; any
//! other 4xx fails immediately. The delay before attempt `n` (1-based) is
//! `base · 2^(n-1)` with the exponent capped at 5, i.e. 1s, 2s, 4s, ... 32s
//! for the default 1000 ms base.

use std::future::Future;
use std::time::Duration;

use pdf_chat_core::{RagError, RagResult};

/// Backoff parameters shared by the embedding and generation clients.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt.saturating_sub(1)).min(5))
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
///
/// Only [`RagError::TransientService`] triggers another attempt. The last
/// transient error is returned once `max_retries` is exhausted.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> RagResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RagResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            tracing::debug!(what, attempt, delay_ms = delay.as_millis() as u64, "retrying");
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                tracing::warn!(what, attempt, error = %err, "transient failure");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Classify a non-success HTTP status from `service`.
pub fn status_error(service: &'static str, status: reqwest::StatusCode, body: &str) -> RagError {
    let message = format!("HTTP {}: {}", status, truncate(body, 500));
    if status.as_u16() == 429 || status.is_server_error() {
        RagError::transient(service, message)
    } else {
        RagError::service(service, message)
    }
}

/// Network-level failures (connect, timeout, reset) are transient.
pub fn transport_error(service: &'static str, err: reqwest::Error) -> RagError {
    RagError::transient(service, err.to_string())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
