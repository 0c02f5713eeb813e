//! Request Timeouts
//!
//! Every provider attempt runs under its own deadline. An elapsed deadline is
//! an ordinary retryable [`LlmError`] of category `Timeout`, so it only reaches
//! the example's result once the retry ceiling is spent.

use std::future::Future;
use std::time::Duration;

use crate::constants::network as net_constants;
use crate::types::LlmError;

/// Deadlines for provider traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Whole request, per attempt (default: 60 seconds)
    pub request: Duration,
    /// TCP/TLS connection setup (default: 30 seconds)
    pub connection: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS),
            connection: Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS),
        }
    }
}

impl TimeoutConfig {
    pub fn with_request(mut self, request: Duration) -> Self {
        self.request = request;
        self
    }
}

/// Execute one provider attempt with a deadline
pub async fn with_timeout<T, F>(timeout: Duration, future: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::timeout(timeout)),
    }
}
