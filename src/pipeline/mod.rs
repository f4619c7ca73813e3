//! Pipeline orchestrator.
//!
//! Drives the per-URL state machine
//! `Queued → Fetching → Deduplicating → Normalizing → Classifying → Fused`
//! (terminal alternatives: `Failed`, `Skipped(duplicate)`) over a bounded
//! worker pool. Rows land in the report in completion order; each row is
//! final the moment it is emitted, so a partial report from an interrupted
//! run is always valid.

pub mod dedup;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::types::{
    FailureKind, PipelineReport, Progress, ReportRow, RowStatus, Verdict,
};
use crate::core::AppState;
use crate::pipeline::dedup::Admission;
use crate::scraping::normalize::normalize;

#[derive(Default)]
struct Counters {
    processed: AtomicUsize,
    failed: AtomicUsize,
    duplicates: AtomicUsize,
    empty: AtomicUsize,
    cancelled: AtomicUsize,
}

enum Disposition {
    Row(ReportRow),
    /// Normalization produced no text: a no-op record, excluded from the report.
    Empty,
}

/// One run over a batch of URLs.
pub struct Pipeline {
    state: Arc<AppState>,
    progress_tx: watch::Sender<Progress>,
}

impl Pipeline {
    pub fn new(state: Arc<AppState>) -> Self {
        let (progress_tx, _) = watch::channel(Progress::default());
        Self { state, progress_tx }
    }

    /// Subscribe to progress snapshots. External observers (progress bars,
    /// logs) read this; the pipeline never waits on them.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    /// Process the batch. Cancelling `cancel` stops dispatching new fetches;
    /// in-flight URLs run to completion and keep their rows.
    pub async fn run(&self, urls: Vec<String>, cancel: CancellationToken) -> PipelineReport {
        let started = Instant::now();
        let total = urls.len();
        let counters = Arc::new(Counters::default());

        info!(
            total,
            workers = self.state.config.worker_pool_size,
            "starting triage run"
        );

        let rows: Vec<Option<ReportRow>> = stream::iter(urls)
            .map(|url| {
                let state = Arc::clone(&self.state);
                let counters = Arc::clone(&counters);
                let cancel = cancel.clone();
                let progress_tx = self.progress_tx.clone();
                async move {
                    if cancel.is_cancelled() {
                        counters.cancelled.fetch_add(1, Ordering::Relaxed);
                        debug!(url, "skipping dispatch: run cancelled");
                        return None;
                    }

                    let disposition = process_url(&state, &url).await;

                    let row = match disposition {
                        Disposition::Row(row) => {
                            match row.status {
                                RowStatus::Failed => {
                                    counters.failed.fetch_add(1, Ordering::Relaxed);
                                }
                                RowStatus::Skipped => {
                                    counters.duplicates.fetch_add(1, Ordering::Relaxed);
                                }
                                RowStatus::Fused => {}
                            }
                            Some(row)
                        }
                        Disposition::Empty => {
                            counters.empty.fetch_add(1, Ordering::Relaxed);
                            None
                        }
                    };

                    let processed = counters.processed.fetch_add(1, Ordering::Relaxed) + 1;
                    progress_tx.send_replace(Progress {
                        processed,
                        total,
                        failed: counters.failed.load(Ordering::Relaxed),
                        duplicates: counters.duplicates.load(Ordering::Relaxed),
                    });
                    debug!(url, processed, total, "url finished");

                    row
                }
            })
            .buffer_unordered(self.state.config.worker_pool_size)
            .collect()
            .await;

        let rows: Vec<ReportRow> = rows.into_iter().flatten().collect();
        let report = PipelineReport {
            total_urls: total,
            fused: rows.iter().filter(|r| r.status == RowStatus::Fused).count(),
            failed: counters.failed.load(Ordering::Relaxed),
            duplicates: counters.duplicates.load(Ordering::Relaxed),
            empty: counters.empty.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
            total_duration_ms: started.elapsed().as_millis() as u64,
            rows,
        };

        info!(
            fused = report.fused,
            failed = report.failed,
            duplicates = report.duplicates,
            empty = report.empty,
            cancelled = report.cancelled,
            duration_ms = report.total_duration_ms,
            "triage run complete"
        );

        report
    }
}

async fn process_url(state: &Arc<AppState>, url: &str) -> Disposition {
    let started = Instant::now();

    let fetched = state.fetcher.fetch(url).await;
    let body = match fetched.body {
        Some(body) => body,
        None => {
            let kind = fetched.error.unwrap_or(crate::core::types::FetchErrorKind::NetworkError);
            warn!(url, error = %kind, attempts = fetched.attempts, "fetch failed");
            return Disposition::Row(ReportRow::failed(
                url,
                kind.into(),
                None,
                started.elapsed().as_millis() as u64,
            ));
        }
    };

    let normalized = normalize(&body);

    let record = match state.dedup.admit(&normalized, url) {
        Admission::Duplicate { first_seen_url, .. } => {
            debug!(url, first_seen_url, "duplicate content");
            return Disposition::Row(ReportRow::skipped(
                url,
                first_seen_url,
                started.elapsed().as_millis() as u64,
            ));
        }
        Admission::Fresh(record) => record,
    };

    if record.normalized_text.is_empty() {
        debug!(url, "no extractable text");
        return Disposition::Empty;
    }

    // Model forward passes are CPU-bound; keep them off the reactor.
    let classical = Arc::clone(&state.classical);
    let deep = Arc::clone(&state.deep);
    let text = record.normalized_text.clone();
    let verdicts = tokio::task::spawn_blocking(move || {
        let classical_verdict = classical.classify(&text)?;
        let deep_verdict = deep.classify(&text)?;
        Ok::<(Verdict, Verdict), crate::core::errors::SentryError>((classical_verdict, deep_verdict))
    })
    .await;

    let (classical_verdict, deep_verdict) = match verdicts {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            warn!(url, error = %e, "classification failed");
            return Disposition::Row(ReportRow::failed(
                url,
                FailureKind::ClassificationError,
                Some(e.to_string()),
                started.elapsed().as_millis() as u64,
            ));
        }
        Err(e) => {
            warn!(url, error = %e, "classification task panicked");
            return Disposition::Row(ReportRow::failed(
                url,
                FailureKind::ClassificationError,
                Some(e.to_string()),
                started.elapsed().as_millis() as u64,
            ));
        }
    };

    let fused = state.fusion.fuse(&classical_verdict, &deep_verdict);
    debug!(
        url,
        label = %fused.label,
        confidence = fused.confidence,
        "verdict fused"
    );

    Disposition::Row(ReportRow {
        source_url: url.to_string(),
        status: RowStatus::Fused,
        normalized_text: Some(record.normalized_text),
        fused: Some(fused),
        classical: Some(classical_verdict),
        deep: Some(deep_verdict),
        error: None,
        error_detail: None,
        duplicate_of: None,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}
