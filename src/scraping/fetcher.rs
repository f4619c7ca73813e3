use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tracing::{debug, warn};
use url::Url;

use crate::core::config::PipelineConfig;
use crate::core::types::{FetchErrorKind, FetchResult};
use crate::features::identity::{stealth_headers, IdentityPool};

/// Blocking responses back off this much harder than plain network errors.
const RATE_LIMIT_BACKOFF_FACTOR: u64 = 4;

/// HTTP fetcher with identity rotation and bounded, jittered backoff.
///
/// All failure modes come back as data inside [`FetchResult`]; nothing
/// escapes this boundary as an error. The retry loop is explicit and runs
/// exactly `max_retries + 1` attempts for retryable failures.
pub struct Fetcher {
    client: reqwest::Client,
    identities: Arc<IdentityPool>,
    max_retries: u32,
    backoff_base_ms: u64,
    backoff_ceiling_ms: u64,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, identities: Arc<IdentityPool>, config: &PipelineConfig) -> Self {
        Self {
            client,
            identities,
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
            backoff_ceiling_ms: config.backoff_ceiling_ms,
        }
    }

    /// Client with the per-attempt hard timeout baked in.
    pub fn build_client(config: &PipelineConfig) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.min(10_000),
            ))
            .build()
    }

    /// Fetch one URL to a terminal [`FetchResult`].
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let started = Instant::now();

        if !is_fetchable_url(url) {
            return FetchResult {
                url: url.to_string(),
                status_code: None,
                body: None,
                elapsed_ms: 0,
                attempts: 0,
                error: Some(FetchErrorKind::MalformedResponse),
            };
        }

        let mut attempts = 0_u32;
        let mut slept_total_ms = 0_u64;
        let mut burned_identity: Option<String> = None;
        let mut last_error = FetchErrorKind::NetworkError;
        let mut last_status: Option<u16> = None;

        for attempt in 0..=self.max_retries {
            let agent = self.identities.pick(burned_identity.as_deref()).to_string();
            attempts += 1;

            let mut request = self.client.get(url).header(USER_AGENT, &agent);
            for (name, value) in stealth_headers() {
                request = request.header(name, value);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    last_status = Some(status);
                    match classify_status(status) {
                        None => {
                            let content_type = response
                                .headers()
                                .get(CONTENT_TYPE)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("")
                                .to_string();
                            if !is_textual(&content_type) {
                                debug!(url, content_type, "non-textual response body");
                                return FetchResult {
                                    url: url.to_string(),
                                    status_code: last_status,
                                    body: None,
                                    elapsed_ms: started.elapsed().as_millis() as u64,
                                    attempts,
                                    error: Some(FetchErrorKind::MalformedResponse),
                                };
                            }
                            return match response.text().await {
                                Ok(body) => FetchResult {
                                    url: url.to_string(),
                                    status_code: last_status,
                                    body: Some(body),
                                    elapsed_ms: started.elapsed().as_millis() as u64,
                                    attempts,
                                    error: None,
                                },
                                Err(e) => {
                                    debug!(url, error = %e, "body decode failed");
                                    FetchResult {
                                        url: url.to_string(),
                                        status_code: last_status,
                                        body: None,
                                        elapsed_ms: started.elapsed().as_millis() as u64,
                                        attempts,
                                        error: Some(FetchErrorKind::MalformedResponse),
                                    }
                                }
                            };
                        }
                        Some(kind @ (FetchErrorKind::NotFound | FetchErrorKind::MalformedResponse)) => {
                            return FetchResult {
                                url: url.to_string(),
                                status_code: last_status,
                                body: None,
                                elapsed_ms: started.elapsed().as_millis() as u64,
                                attempts,
                                error: Some(kind),
                            };
                        }
                        Some(kind) => {
                            last_error = kind;
                        }
                    }
                }
                Err(e) => {
                    debug!(url, error = %e, "request failed");
                    last_status = None;
                    last_error = FetchErrorKind::NetworkError;
                }
            }

            // This identity is tainted for the next attempt of this chain.
            burned_identity = Some(agent);

            if attempt == self.max_retries {
                break;
            }

            let rate_limited = last_error == FetchErrorKind::RateLimited;
            let delay = jittered(backoff_delay_ms(attempt, self.backoff_base_ms, rate_limited));
            let delay = delay.min(self.backoff_ceiling_ms.saturating_sub(slept_total_ms));
            warn!(
                url,
                attempt = attempt + 1,
                error = %last_error,
                delay_ms = delay,
                "retrying fetch"
            );
            if delay > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                slept_total_ms += delay;
            }
        }

        FetchResult {
            url: url.to_string(),
            status_code: last_status,
            body: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
            attempts,
            error: Some(last_error),
        }
    }
}

fn is_fetchable_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Map an HTTP status to a failure kind; `None` means success.
pub(crate) fn classify_status(status: u16) -> Option<FetchErrorKind> {
    match status {
        200..=299 => None,
        404 | 410 => Some(FetchErrorKind::NotFound),
        401 | 403 | 429 => Some(FetchErrorKind::RateLimited),
        400..=499 => Some(FetchErrorKind::MalformedResponse),
        _ => Some(FetchErrorKind::NetworkError),
    }
}

fn is_textual(content_type: &str) -> bool {
    if content_type.is_empty() {
        return true;
    }
    let ct = content_type.to_ascii_lowercase();
    ct.starts_with("text/") || ct.contains("html") || ct.contains("json") || ct.contains("xml")
}

/// Exponential backoff before jitter. Rate-limited attempts start from a
/// longer base.
pub(crate) fn backoff_delay_ms(attempt: u32, base_ms: u64, rate_limited: bool) -> u64 {
    let base = if rate_limited {
        base_ms.saturating_mul(RATE_LIMIT_BACKOFF_FACTOR)
    } else {
        base_ms
    };
    base.saturating_mul(1_u64 << attempt.min(16))
}

/// ±20% jitter to avoid retry pattern detection.
fn jittered(delay_ms: u64) -> u64 {
    use rand::prelude::*;
    if delay_ms == 0 {
        return 0;
    }
    let mut rng = rand::rng();
    let jitter_range = (delay_ms as f64 * 0.2) as i64;
    if jitter_range == 0 {
        return delay_ms;
    }
    let jitter = rng.random_range(-jitter_range..=jitter_range);
    (delay_ms as i64 + jitter).max(1) as u64
}
