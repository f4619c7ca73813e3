use std::sync::Arc;

use crate::classify::fusion::FusionPolicy;
use crate::classify::TextClassifier;
use crate::core::config::PipelineConfig;
use crate::core::errors::{Result, SentryError};
use crate::features::identity::IdentityPool;
use crate::pipeline::dedup::DedupIndex;
use crate::scraping::fetcher::Fetcher;

/// Everything a run shares across workers, owned explicitly and passed in.
/// No ambient globals.
///
/// The identity pool and the two classifiers are read-only after
/// construction; the dedup index serializes its own admissions internally.
pub struct AppState {
    pub config: PipelineConfig,
    pub http_client: reqwest::Client,
    pub identities: Arc<IdentityPool>,
    pub fetcher: Fetcher,
    pub dedup: DedupIndex,
    pub classical: Arc<dyn TextClassifier>,
    pub deep: Arc<dyn TextClassifier>,
    pub fusion: FusionPolicy,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("identity_pool_size", &self.identities.len())
            .field("dedup_entries", &self.dedup.len())
            .finish()
    }
}

impl AppState {
    pub fn new(
        config: PipelineConfig,
        classical: Arc<dyn TextClassifier>,
        deep: Arc<dyn TextClassifier>,
    ) -> Result<Self> {
        config.validate()?;

        let http_client = Fetcher::build_client(&config)
            .map_err(|e| SentryError::Config(format!("failed to build http client: {e}")))?;
        let identities = Arc::new(IdentityPool::new());
        let fetcher = Fetcher::new(http_client.clone(), Arc::clone(&identities), &config);

        Ok(Self {
            fusion: FusionPolicy::new(config.confidence_tie_epsilon),
            config,
            http_client,
            identities,
            fetcher,
            dedup: DedupIndex::new(),
            classical,
            deep,
        })
    }

    /// Swap in a deployment-specific identity pool.
    pub fn with_identities(mut self, identities: Arc<IdentityPool>) -> Self {
        self.fetcher = Fetcher::new(
            self.http_client.clone(),
            Arc::clone(&identities),
            &self.config,
        );
        self.identities = identities;
        self
    }
}
