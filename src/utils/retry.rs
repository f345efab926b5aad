use alloy_transport::{TransportError, TransportErrorKind};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{error::Error as StdError, future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::utils::strip_html;

/// Backoff for RPC transport failures. Responses the node produced, trace
/// errors included, are final for a given block and never retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            exponential: 2.0,
        }
    }
}

impl RetryConfig {
    /// Jittered delay after failed attempt `attempt`, growing exponentially
    /// from `base_delay_ms` and capped at `max_delay_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ceiling = (self.base_delay_ms as f64 * self.exponential.powi(exponent))
            .min(self.max_delay_ms as f64);
        Duration::from_millis((fastrand::f64() * ceiling) as u64)
    }
}

/// Errors that may succeed when the same request is sent again.
pub trait Retryable: StdError + Send + Sync + 'static {
    fn is_retryable(&self) -> bool;
}

impl Retryable for TransportError {
    /// Connection failures and non-2xx HTTP statuses are retried. A JSON-RPC
    /// error response, such as a node without tracing enabled, is not.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Transport(
                TransportErrorKind::HttpError(_)
                    | TransportErrorKind::Custom(_)
                    | TransportErrorKind::BackendGone
            )
        )
    }
}

pub async fn retry<F, Fut, T, E>(operation: F, config: &RetryConfig, context: &str) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Retryable,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(anyhow::Error::new(err).context(format!("'{context}' was rejected")));
        }

        let message = strip_html(&err.to_string());
        if attempt >= max_attempts {
            error!("'{}' failed after {} attempts: {}", context, attempt, message);
            return Err(anyhow!(message).context(format!("'{context}' failed after {attempt} attempts")));
        }

        let delay = config.backoff(attempt);
        warn!(
            "Attempt {}/{} for '{}' failed: {}. Retrying in {:?}",
            attempt, max_attempts, context, message, delay
        );
        sleep(delay).await;
    }
}
