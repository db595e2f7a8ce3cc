//! Backend Trait
//!
//! The remote reasoning service every role talks to. One system instruction
//! plus one user message in, one text completion out.

use async_trait::async_trait;
use std::time::Duration;

/// Failure modes a backend can surface
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Rate limited by backend{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient backend failure: {0}")]
    Transient(String),

    #[error("Backend rejected request: {0}")]
    Rejected(String),
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl BackendError {
    /// Rate limits and transient failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Text generation backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Complete `message` under the given system instruction
    async fn complete(&self, system: &str, message: &str) -> Result<String, BackendError>;
}
