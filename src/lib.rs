pub mod classify;
pub mod core;
pub mod features;
pub mod pipeline;
pub mod scraping;

// --- Primary core exports ---
pub use crate::core::config::PipelineConfig;
pub use crate::core::errors::{Result, SentryError};
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::AppState;

// --- Component exports ---
pub use crate::classify::classical::ClassicalClassifier;
pub use crate::classify::deep::DeepClassifier;
pub use crate::classify::fusion::FusionPolicy;
pub use crate::classify::TextClassifier;
pub use crate::features::identity::IdentityPool;
pub use crate::pipeline::dedup::{Admission, DedupIndex};
pub use crate::pipeline::Pipeline;
pub use crate::scraping::fetcher::Fetcher;
pub use crate::scraping::normalize::normalize;
