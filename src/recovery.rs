//! Retry With Backoff
//!
//! Every backend call goes through a [`RetryExecutor`]:
//! - Exponential backoff: `initial_delay * 2^attempt`
//! - Uniform jitter on top, so rate-limited callers do not resynchronise
//! - Hard cap at `max_delay`
//! - Rate limits and transient failures retry, rejections do not

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::backend::BackendError;
use crate::error::AnalysisError;

/// Invalid retry bounds
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("max_retries must be at least 1")]
    NoAttempts,
    #[error("initial_delay must be greater than zero")]
    ZeroInitialDelay,
    #[error("max_delay ({max:?}) is shorter than initial_delay ({initial:?})")]
    MaxBelowInitial { initial: Duration, max: Duration },
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call
    max_retries: usize,
    initial_delay: Duration,
    max_delay: Duration,
    /// Upper bound of the random addend
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: usize,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, PolicyError> {
        if max_retries == 0 {
            return Err(PolicyError::NoAttempts);
        }
        if initial_delay.is_zero() {
            return Err(PolicyError::ZeroInitialDelay);
        }
        if max_delay < initial_delay {
            return Err(PolicyError::MaxBelowInitial {
                initial: initial_delay,
                max: max_delay,
            });
        }
        Ok(Self {
            max_retries,
            initial_delay,
            max_delay,
            jitter: Duration::from_secs(1),
        })
    }

    /// Set the jitter bound
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Delay before retry `attempt` (0-based) for a jitter sample in `[0, 1]`
    pub fn backoff(&self, attempt: usize, jitter_sample: f64) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * 2f64.powi(exponent);
        let jitter = self.jitter.as_secs_f64() * jitter_sample.clamp(0.0, 1.0);
        let capped = (base + jitter).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Delay before retry `attempt` with fresh jitter
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let sample = rand::thread_rng().gen_range(0.0..=1.0);
        self.backoff(attempt, sample)
    }

    /// Longest total sleep a single call can accumulate
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_retries.saturating_sub(1))
            .map(|attempt| self.backoff(attempt, 1.0))
            .sum()
    }
}

/// How a retried call ended
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// Call succeeded after `delays.len()` retries
    Success { value: T, delays: Vec<Duration> },
    /// Every attempt failed with a retryable error
    Exhausted {
        error: BackendError,
        delays: Vec<Duration>,
    },
    /// A non-retryable error stopped the loop
    Rejected {
        error: BackendError,
        delays: Vec<Duration>,
    },
}

impl<T> RetryOutcome<T> {
    /// Calls made, including the first
    pub fn attempts(&self) -> usize {
        self.delays().len() + 1
    }

    pub fn delays(&self) -> &[Duration] {
        match self {
            Self::Success { delays, .. }
            | Self::Exhausted { delays, .. }
            | Self::Rejected { delays, .. } => delays,
        }
    }

    /// Convert into a pipeline result, tagging failures with `label`
    pub fn into_result(self, label: &str) -> Result<T, AnalysisError> {
        let attempts = self.attempts();
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Exhausted { error, .. } => Err(AnalysisError::BackendExhausted {
                label: label.to_string(),
                attempts,
                source: error,
            }),
            Self::Rejected { error, .. } => Err(AnalysisError::BackendRejected {
                label: label.to_string(),
                source: error,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct RetryCounters {
    calls: AtomicU64,
    successful: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    rate_limited: AtomicU64,
}

/// Retry loop shared by every stage
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    counters: Arc<RetryCounters>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            counters: Arc::new(RetryCounters::default()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, is rejected, or attempts run out
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        let mut delays = Vec::new();

        loop {
            let error = match operation().await {
                Ok(value) => {
                    self.counters.successful.fetch_add(1, Ordering::Relaxed);
                    return RetryOutcome::Success { value, delays };
                }
                Err(e) => e,
            };

            if error.is_rate_limited() {
                self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            }

            if !error.is_retryable() {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return RetryOutcome::Rejected { error, delays };
            }

            let attempt = delays.len();
            if attempt + 1 >= self.policy.max_retries {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return RetryOutcome::Exhausted { error, delays };
            }

            let wait = self.policy.delay_for_attempt(attempt);
            warn!(
                label,
                attempt = attempt + 1,
                max_attempts = self.policy.max_retries,
                error = %error,
                wait_secs = wait.as_secs_f64(),
                "Backend call failed, retrying"
            );

            self.counters.retried.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(wait).await;
            delays.push(wait);
        }
    }

    /// [`run`](Self::run) mapped onto the pipeline error type
    pub async fn execute<F, Fut, T>(&self, label: &str, operation: F) -> Result<T, AnalysisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        self.run(label, operation).await.into_result(label)
    }

    pub fn stats(&self) -> RetryStats {
        RetryStats {
            calls: self.counters.calls.load(Ordering::Relaxed),
            successful: self.counters.successful.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of retry counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub calls: u64,
    pub successful: u64,
    pub retried: u64,
    pub failed: u64,
    pub rate_limited: u64,
}

impl RetryStats {
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            1.0
        } else {
            self.successful as f64 / self.calls as f64
        }
    }

    pub fn format(&self) -> String {
        format!(
            "{:.1}% success ({}/{} calls, {} retries, {} rate limited, {} failed)",
            self.success_rate() * 100.0,
            self.successful,
            self.calls,
            self.retried,
            self.rate_limited,
            self.failed
        )
    }
}
