// ABOUTME: Retry boundary for storage calls with per-attempt timeouts and exponential backoff
// ABOUTME: Converts exhausted retries into StoreUnavailable and fatal failures into StoreFailure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::StoreResult;
use crate::config::StorePolicyConfig;
use crate::errors::{ProtocolError, StoreError};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, warn};

/// Timeout and retry policy applied to every store call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
    /// Budget for a single attempt
    pub attempt_timeout: Duration,
    /// Total attempts for retryable failures
    pub max_attempts: u32,
    /// First backoff; doubled after each failed attempt
    pub base_backoff: Duration,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self::from(&StorePolicyConfig::default())
    }
}

impl From<&StorePolicyConfig> for StorePolicy {
    fn from(config: &StorePolicyConfig) -> Self {
        Self {
            attempt_timeout: Duration::from_millis(config.timeout_ms),
            max_attempts: config.max_retries.max(1),
            base_backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

impl StorePolicy {
    /// Backoff before attempt `attempt + 1`: base, 2x base, 4x base, ...
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1 << exponent)
    }

    /// Run `f` under the policy
    ///
    /// Each attempt is bounded by `attempt_timeout`. Retryable failures
    /// (timeouts, locked or unreachable store) are retried with exponential
    /// backoff; any other failure returns immediately.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` when retries are exhausted and
    /// `StoreFailure` for a non-retryable store error
    pub async fn run<F, Fut, T>(&self, operation: &'static str, mut f: F) -> Result<T, ProtocolError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = timeout(self.attempt_timeout, f())
                .await
                .unwrap_or_else(|_| {
                    Err(StoreError::Timeout {
                        operation,
                        timeout_ms: self.attempt_timeout.as_millis() as u64,
                    })
                });

            match result {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    error!(operation, attempts, error = %e, "Store operation failed with non-retryable error");
                    return Err(ProtocolError::StoreFailure {
                        operation,
                        source: e,
                    });
                }
                Err(e) if attempts >= self.max_attempts => {
                    error!(operation, attempts, error = %e, "Store operation failed after max retries");
                    return Err(ProtocolError::StoreUnavailable {
                        operation,
                        attempts,
                        source: e,
                    });
                }
                Err(e) => {
                    let backoff = self.backoff(attempts);
                    warn!(
                        operation,
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Store operation failed with retryable error, retrying after backoff"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}
