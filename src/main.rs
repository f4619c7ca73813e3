use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use page_sentry::{
    AppState, ClassicalClassifier, DeepClassifier, Pipeline, PipelineConfig, TextClassifier,
};

/// Scan argv for `--name value` or `--name=value`.
fn parse_flag(name: &str) -> Option<String> {
    let long = format!("--{name}");
    let long_eq = format!("--{name}=");
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == long {
            if let Some(v) = args.next() {
                return Some(v);
            }
        } else if let Some(rest) = a.strip_prefix(&long_eq) {
            return Some(rest.to_string());
        }
    }
    None
}

fn flag_or_env(flag: &str, env: &str) -> Option<String> {
    parse_flag(flag).or_else(|| std::env::var(env).ok().filter(|v| !v.trim().is_empty()))
}

/// Default on-disk cache for hub-downloaded models.
fn default_model_cache() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".page-sentry").join("models"))
}

async fn load_deep_classifier(config: &PipelineConfig) -> anyhow::Result<DeepClassifier> {
    if let Some(dir) = flag_or_env("model-dir", "PAGE_SENTRY_MODEL_DIR") {
        info!(model_dir = %dir, "loading deep classifier from local directory");
        return DeepClassifier::from_dir(&PathBuf::from(dir), config.max_sequence_length)
            .map_err(|e| anyhow!(e));
    }
    if let Some(model_id) = flag_or_env("model-id", "PAGE_SENTRY_MODEL_ID") {
        let cache = default_model_cache();
        info!(model_id = %model_id, "loading deep classifier from hub");
        return DeepClassifier::from_hub(
            &model_id,
            cache.as_deref(),
            config.max_sequence_length,
        )
        .await
        .map_err(|e| anyhow!(e));
    }
    Err(anyhow!(
        "no deep model configured: pass --model-dir/--model-id or set PAGE_SENTRY_MODEL_DIR/PAGE_SENTRY_MODEL_ID"
    ))
}

fn load_classical_classifier() -> anyhow::Result<ClassicalClassifier> {
    match flag_or_env("classical-weights", "PAGE_SENTRY_CLASSICAL_WEIGHTS") {
        Some(path) => {
            info!(weights = %path, "loading classical classifier weights");
            ClassicalClassifier::from_file(&PathBuf::from(path)).map_err(|e| anyhow!(e))
        }
        None => {
            info!("using built-in classical classifier weights");
            Ok(ClassicalClassifier::builtin())
        }
    }
}

async fn read_url_list(path: &str) -> anyhow::Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read url list {path}"))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let input = parse_flag("input")
        .ok_or_else(|| anyhow!("usage: page-sentry --input <url-file> [--output <report.json>]"))?;
    let output = parse_flag("output").unwrap_or_else(|| {
        format!(
            "sentry_report_{}.json",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        )
    });

    let config = PipelineConfig::from_env();
    info!(?config, "pipeline configuration");

    let urls = read_url_list(&input).await?;
    if urls.is_empty() {
        warn!(input, "url list is empty, nothing to do");
        return Ok(());
    }
    info!(count = urls.len(), "url list loaded");

    // Model initialization is the only fatal phase: a run without both
    // classifiers is meaningless.
    let classical: Arc<dyn TextClassifier> = Arc::new(load_classical_classifier()?);
    let deep: Arc<dyn TextClassifier> = Arc::new(load_deep_classifier(&config).await?);

    let state = Arc::new(AppState::new(config, classical, deep).map_err(|e| anyhow!(e))?);
    let pipeline = Pipeline::new(state);

    // Ctrl-C stops dispatching new fetches; in-flight URLs finish.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, draining in-flight work");
                cancel.cancel();
            }
        });
    }

    // External progress observer.
    {
        let mut progress = pipeline.progress();
        tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let p = *progress.borrow();
                info!(
                    processed = p.processed,
                    total = p.total,
                    failed = p.failed,
                    duplicates = p.duplicates,
                    "progress"
                );
            }
        });
    }

    let report = pipeline.run(urls, cancel).await;

    let json = serde_json::to_string_pretty(&report)?;
    tokio::fs::write(&output, json)
        .await
        .with_context(|| format!("failed to write report to {output}"))?;

    info!(
        output,
        fused = report.fused,
        failed = report.failed,
        duplicates = report.duplicates,
        "report written"
    );
    Ok(())
}
