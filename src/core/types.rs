use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::classify::labels::ThreatLabel;

/// How a fetch attempt (or chain of attempts) failed.
///
/// `NetworkError` and `RateLimited` are retried; `NotFound` and
/// `MalformedResponse` are terminal on first sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    NetworkError,
    RateLimited,
    NotFound,
    MalformedResponse,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::MalformedResponse => "malformed_response",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of fetching one URL. Errors are carried as data here,
/// never raised past the fetcher boundary.
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub url: String,
    pub status_code: Option<u16>,
    /// Decoded response body on success; absent on any failure.
    #[serde(skip_serializing)]
    pub body: Option<String>,
    pub elapsed_ms: u64,
    /// Number of HTTP attempts actually issued (0 for an unparseable URL).
    pub attempts: u32,
    pub error: Option<FetchErrorKind>,
}

impl FetchResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A unique piece of normalized content, created at most once per hash for
/// the duration of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ContentRecord {
    pub content_hash: String,
    pub normalized_text: String,
    pub source_url: String,
    pub first_seen: DateTime<Utc>,
}

/// Which model produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Classical,
    Deep,
    Fused,
}

/// One classification decision: a label plus a confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: ThreatLabel,
    pub confidence: f64,
    pub source: ModelSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Fused,
    Failed,
    Skipped,
}

/// Failure kinds surfaced in report rows. Extends the fetch taxonomy with
/// per-item classification failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NetworkError,
    RateLimited,
    NotFound,
    MalformedResponse,
    ClassificationError,
}

impl From<FetchErrorKind> for FailureKind {
    fn from(kind: FetchErrorKind) -> Self {
        match kind {
            FetchErrorKind::NetworkError => Self::NetworkError,
            FetchErrorKind::RateLimited => Self::RateLimited,
            FetchErrorKind::NotFound => Self::NotFound,
            FetchErrorKind::MalformedResponse => Self::MalformedResponse,
        }
    }
}

/// One finalized row of the run's report. Rows are appended in completion
/// order and are never revisited once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub source_url: String,
    pub status: RowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classical: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// For `Skipped` rows: the URL whose content this page duplicated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    pub duration_ms: u64,
}

impl ReportRow {
    pub fn failed(url: &str, kind: FailureKind, detail: Option<String>, duration_ms: u64) -> Self {
        Self {
            source_url: url.to_string(),
            status: RowStatus::Failed,
            normalized_text: None,
            fused: None,
            classical: None,
            deep: None,
            error: Some(kind),
            error_detail: detail,
            duplicate_of: None,
            duration_ms,
        }
    }

    pub fn skipped(url: &str, duplicate_of: String, duration_ms: u64) -> Self {
        Self {
            source_url: url.to_string(),
            status: RowStatus::Skipped,
            normalized_text: None,
            fused: None,
            classical: None,
            deep: None,
            error: None,
            error_detail: None,
            duplicate_of: Some(duplicate_of),
            duration_ms,
        }
    }
}

/// Full output of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub total_urls: usize,
    pub fused: usize,
    pub failed: usize,
    pub duplicates: usize,
    /// Pages whose normalization produced no text (no-op records).
    pub empty: usize,
    /// URLs never dispatched because the run was cancelled first.
    pub cancelled: usize,
    pub total_duration_ms: u64,
    pub rows: Vec<ReportRow>,
}

/// Periodic progress snapshot published while a run advances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub failed: usize,
    pub duplicates: usize,
}
