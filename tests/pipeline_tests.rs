//! End-to-end pipeline tests against a local mock HTTP server.
//!
//! The deep model is injected as a stub through the `TextClassifier` seam so
//! these tests exercise fetching, retry, dedup, normalization and fusion
//! without model files on disk.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use page_sentry::{
    AppState, ClassicalClassifier, FailureKind, ModelSource, Pipeline, PipelineConfig, RowStatus,
    TextClassifier, ThreatLabel, Verdict,
};

/// Fixed-output classifier for tests.
struct StaticClassifier {
    source: ModelSource,
    label: ThreatLabel,
    confidence: f64,
}

impl TextClassifier for StaticClassifier {
    fn source(&self) -> ModelSource {
        self.source
    }

    fn classify(&self, _text: &str) -> page_sentry::Result<Verdict> {
        Ok(Verdict {
            label: self.label,
            confidence: self.confidence,
            source: self.source,
        })
    }
}

fn stub(source: ModelSource, label: ThreatLabel, confidence: f64) -> Arc<dyn TextClassifier> {
    Arc::new(StaticClassifier {
        source,
        label,
        confidence,
    })
}

fn fast_config(max_retries: u32) -> PipelineConfig {
    PipelineConfig {
        max_retries,
        worker_pool_size: 2,
        backoff_base_ms: 1,
        backoff_ceiling_ms: 50,
        request_timeout_ms: 5_000,
        ..Default::default()
    }
}

fn test_state(config: PipelineConfig) -> Arc<AppState> {
    let classical = stub(ModelSource::Classical, ThreatLabel::Benign, 0.9);
    let deep = stub(ModelSource::Deep, ThreatLabel::Benign, 0.8);
    Arc::new(AppState::new(config, classical, deep).unwrap())
}

fn html_page(text: &str) -> String {
    format!("<html><head><title>t</title></head><body><p>{text}</p></body></html>")
}

async fn run(state: Arc<AppState>, urls: Vec<String>) -> page_sentry::PipelineReport {
    Pipeline::new(state)
        .run(urls, CancellationToken::new())
        .await
}

#[tokio::test]
async fn always_failing_url_is_retried_exactly_max_retries_plus_one_times() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/boom"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let report = run(
        test_state(fast_config(2)),
        vec![format!("{}/boom", server.uri())],
    )
    .await;

    assert_eq!(report.rows.len(), 1);
    let row = &report.rows[0];
    assert_eq!(row.status, RowStatus::Failed);
    assert_eq!(row.error, Some(FailureKind::NetworkError));
    assert_eq!(report.failed, 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3, "expected max_retries + 1 attempts");
}

#[tokio::test]
async fn not_found_is_terminal_after_a_single_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let report = run(
        test_state(fast_config(3)),
        vec![format!("{}/missing", server.uri())],
    )
    .await;

    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].status, RowStatus::Failed);
    assert_eq!(report.rows[0].error, Some(FailureKind::NotFound));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "404 must not be retried");
}

#[tokio::test]
async fn repeated_content_is_reported_once_plus_a_skip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(html_page("alpha page content for deduplication")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(html_page("beta page content, entirely different")),
        )
        .mount(&server)
        .await;

    let a = format!("{}/a", server.uri());
    let b = format!("{}/b", server.uri());
    let report = run(test_state(fast_config(1)), vec![a.clone(), b, a]).await;

    assert_eq!(report.fused, 2, "one row per unique content");
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.rows.len(), 3);

    let skipped: Vec<_> = report
        .rows
        .iter()
        .filter(|r| r.status == RowStatus::Skipped)
        .collect();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].duplicate_of.is_some());
}

#[tokio::test]
async fn rate_limited_retry_switches_identity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guarded"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guarded"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(html_page("finally served content")),
        )
        .mount(&server)
        .await;

    let report = run(
        test_state(fast_config(2)),
        vec![format!("{}/guarded", server.uri())],
    )
    .await;

    assert_eq!(report.fused, 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let ua_first = requests[0].headers.get("user-agent").unwrap();
    let ua_second = requests[1].headers.get("user-agent").unwrap();
    assert_ne!(
        ua_first, ua_second,
        "the identity that hit the rate limit must not be reused"
    );
}

#[tokio::test]
async fn pages_without_text_are_excluded_from_the_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blank"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body><script>var x = 1;</script></body></html>"),
        )
        .mount(&server)
        .await;

    let report = run(
        test_state(fast_config(1)),
        vec![format!("{}/blank", server.uri())],
    )
    .await;

    assert!(report.rows.is_empty());
    assert_eq!(report.empty, 1);
}

#[tokio::test]
async fn cancelled_run_dispatches_no_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let urls = vec![
        format!("{}/one", server.uri()),
        format!("{}/two", server.uri()),
    ];
    let report = Pipeline::new(test_state(fast_config(1)))
        .run(urls, cancel)
        .await;

    assert!(report.rows.is_empty());
    assert_eq!(report.cancelled, 2);
    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn unparseable_url_fails_without_any_request() {
    let report = run(
        test_state(fast_config(3)),
        vec!["not a url at all".to_string()],
    )
    .await;

    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].status, RowStatus::Failed);
    assert_eq!(report.rows[0].error, Some(FailureKind::MalformedResponse));
}

#[tokio::test]
async fn classical_verdict_outvotes_uncertain_deep_stub() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payload"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(html_page(
                    "id=1' UNION SELECT username, password FROM information_schema --",
                )),
        )
        .mount(&server)
        .await;

    let classical: Arc<dyn TextClassifier> = Arc::new(ClassicalClassifier::builtin());
    let deep = stub(ModelSource::Deep, ThreatLabel::Benign, 0.5);
    let state = Arc::new(AppState::new(fast_config(1), classical, deep).unwrap());

    let report = run(state, vec![format!("{}/payload", server.uri())]).await;

    assert_eq!(report.fused, 1);
    let row = &report.rows[0];
    let fused = row.fused.unwrap();
    assert_eq!(fused.label, ThreatLabel::SqlInjection);
    assert_eq!(fused.source, ModelSource::Fused);
    assert_eq!(row.classical.unwrap().label, ThreatLabel::SqlInjection);
    assert_eq!(row.deep.unwrap().label, ThreatLabel::Benign);
}

#[test]
fn identical_text_classified_twice_yields_identical_verdicts() {
    let classifier = ClassicalClassifier::builtin();
    let text = "login form posts to /auth and sets a session cookie on success";
    let first = classifier.classify(text).unwrap();
    let second = classifier.classify(text).unwrap();
    assert_eq!(first.label, second.label);
    assert_eq!(first.confidence, second.confidence);
}
