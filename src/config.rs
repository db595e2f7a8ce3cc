//! Configuration management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::recovery::{PolicyError, RetryPolicy};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },

    #[error("Invalid retry policy: {0}")]
    Retry(#[from] PolicyError),
}

/// Analyzer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Anthropic API key (required for real backend calls)
    pub anthropic_api_key: Option<String>,

    /// Model id sent to the backend
    pub model: String,

    /// Max response tokens per call
    pub max_tokens: usize,

    /// Per-request deadline, applied to every backend call
    pub request_timeout: Duration,

    /// Backoff applied around every backend call
    pub retry: RetryPolicy,

    /// Concurrent section analyses
    pub max_concurrency: usize,

    /// Where analysis results are written
    pub results_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            request_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            max_concurrency: default_concurrency(),
            results_dir: PathBuf::from("analysis_results"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let anthropic_api_key = lookup("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty());

        let model = lookup("PAPER_ANALYST_MODEL").unwrap_or(default.model);

        let max_tokens = parse_or(&lookup, "PAPER_ANALYST_MAX_TOKENS", default.max_tokens)?;
        if max_tokens == 0 {
            return Err(ConfigError::Zero {
                var: "PAPER_ANALYST_MAX_TOKENS",
            });
        }

        let timeout_secs = parse_or(
            &lookup,
            "PAPER_ANALYST_REQUEST_TIMEOUT",
            default.request_timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Zero {
                var: "PAPER_ANALYST_REQUEST_TIMEOUT",
            });
        }

        let max_retries = parse_or(
            &lookup,
            "PAPER_ANALYST_MAX_RETRIES",
            default.retry.max_retries(),
        )?;
        let initial_delay_ms = parse_or(
            &lookup,
            "PAPER_ANALYST_INITIAL_DELAY_MS",
            default.retry.initial_delay().as_millis() as u64,
        )?;
        let max_delay_ms = parse_or(
            &lookup,
            "PAPER_ANALYST_MAX_DELAY_MS",
            default.retry.max_delay().as_millis() as u64,
        )?;
        let retry = RetryPolicy::new(
            max_retries,
            Duration::from_millis(initial_delay_ms),
            Duration::from_millis(max_delay_ms),
        )?;

        let max_concurrency = parse_or(
            &lookup,
            "PAPER_ANALYST_MAX_CONCURRENCY",
            default.max_concurrency,
        )?;
        if max_concurrency == 0 {
            return Err(ConfigError::Zero {
                var: "PAPER_ANALYST_MAX_CONCURRENCY",
            });
        }

        let results_dir = lookup("PAPER_ANALYST_RESULTS_DIR")
            .map(PathBuf::from)
            .unwrap_or(default.results_dir);

        Ok(Self {
            anthropic_api_key,
            model,
            max_tokens,
            request_timeout: Duration::from_secs(timeout_secs),
            retry,
            max_concurrency,
            results_dir,
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

/// Hardware parallelism, 1 when unknown
fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
