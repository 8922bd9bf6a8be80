//! Caller-side retry with exponential backoff
//!
//! The pool never retries a failed dial. Callers that want to ride out
//! transient failures wrap their operation in [`retry_connect`].

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{ConnectError, ExecError};

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry in milliseconds
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Default upper bound on any single delay in milliseconds
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default backoff multiplier
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Backoff schedule
///
/// Delay before retry `n` (0-indexed) is
/// `min(initial_delay * multiplier^n, max_delay)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Cap on any single delay in milliseconds
    pub max_delay_ms: u64,
    /// Growth factor between delays
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sets the number of retries
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the initial delay
    #[must_use]
    pub const fn with_initial_delay_ms(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    /// Sets the delay cap
    #[must_use]
    pub const fn with_max_delay_ms(mut self, delay_ms: u64) -> Self {
        self.max_delay_ms = delay_ms;
        self
    }

    /// Delay before retry `retry` (0-indexed), `None` once retries are exhausted
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if delay_ms.is_finite() {
            (delay_ms as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        };
        Some(Duration::from_millis(capped))
    }

    /// First attempt plus retries
    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Errors worth another attempt
///
/// Rejected credentials and a closed pool will fail the same way again.
pub trait Retryable {
    /// Whether a retry might succeed
    fn is_retryable(&self) -> bool;
}

impl Retryable for ConnectError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Unreachable(_) | Self::Transport(_)
        )
    }
}

impl Retryable for ExecError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(e) if e.is_retryable())
    }
}

/// Runs `op` until it succeeds, fails permanently or retries run out
///
/// # Errors
///
/// Returns the last error.
pub async fn retry_connect<T, E, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => match config.delay_for_retry(retry) {
                Some(delay) => {
                    debug!(
                        attempt = retry + 1,
                        total = config.total_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}
