//! Single-retry helper for transient network failures
//!
//! Drivers are allowed at most one retry on a transient error; anything
//! else propagates immediately.

use crate::{MagnetarrError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Configuration for the transient retry.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause before the retry.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(250),
        }
    }
}

/// Run `operation`, retrying transient failures up to the configured
/// attempt count.
pub async fn retry_transient<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_attempts => {
                debug!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(config.delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Convenience for checking whether an error would have been retried.
pub fn is_transient(err: &MagnetarrError) -> bool {
    err.is_transient()
}
