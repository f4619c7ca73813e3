use serde::Deserialize;

use crate::core::errors::{Result, SentryError};

/// Runtime configuration for a pipeline run.
///
/// Every field has a default and a `PAGE_SENTRY_*` environment override, so
/// the binary works with zero configuration and deployments can tune it
/// without a config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retries after the first attempt; a URL is tried `max_retries + 1` times.
    pub max_retries: u32,
    /// Concurrent URL workers.
    pub worker_pool_size: usize,
    /// Token limit per document for the deep classifier. Longer inputs are
    /// truncated from the end.
    pub max_sequence_length: usize,
    /// Confidence gap below which disagreeing verdicts count as tied.
    pub confidence_tie_epsilon: f64,
    /// First-retry backoff; doubles per attempt, with jitter.
    pub backoff_base_ms: u64,
    /// Cap on cumulative backoff sleeping per URL. Bounds waiting, not the
    /// attempt count.
    pub backoff_ceiling_ms: u64,
    /// Hard per-attempt HTTP timeout.
    pub request_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            worker_pool_size: 8,
            max_sequence_length: 256,
            confidence_tie_epsilon: 0.05,
            backoff_base_ms: 250,
            backoff_ceiling_ms: 10_000,
            request_timeout_ms: 10_000,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl PipelineConfig {
    /// Defaults overlaid with any `PAGE_SENTRY_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse("PAGE_SENTRY_MAX_RETRIES") {
            cfg.max_retries = v;
        }
        if let Some(v) = env_parse("PAGE_SENTRY_WORKERS") {
            cfg.worker_pool_size = v;
        }
        if let Some(v) = env_parse("PAGE_SENTRY_MAX_SEQ_LEN") {
            cfg.max_sequence_length = v;
        }
        if let Some(v) = env_parse("PAGE_SENTRY_TIE_EPSILON") {
            cfg.confidence_tie_epsilon = v;
        }
        if let Some(v) = env_parse("PAGE_SENTRY_BACKOFF_BASE_MS") {
            cfg.backoff_base_ms = v;
        }
        if let Some(v) = env_parse("PAGE_SENTRY_BACKOFF_CEILING_MS") {
            cfg.backoff_ceiling_ms = v;
        }
        if let Some(v) = env_parse("PAGE_SENTRY_REQUEST_TIMEOUT_MS") {
            cfg.request_timeout_ms = v;
        }
        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(SentryError::Config(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.max_sequence_length == 0 {
            return Err(SentryError::Config(
                "max_sequence_length must be greater than 0".to_string(),
            ));
        }
        if !self.confidence_tie_epsilon.is_finite() || self.confidence_tie_epsilon < 0.0 {
            return Err(SentryError::Config(
                "confidence_tie_epsilon must be a non-negative finite number".to_string(),
            ));
        }
        if self.backoff_base_ms == 0 {
            return Err(SentryError::Config(
                "backoff_base_ms must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(SentryError::Config(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
