use thiserror::Error;

/// Errors that can cross the library boundary.
///
/// Per-URL fetch failures are *not* errors; they travel as data inside
/// [`crate::types::FetchResult`]. Only resource initialization
/// (`ModelLoad`, `Config`) aborts a run; `Classification` is contained to
/// the row it occurred on.
#[derive(Debug, Error)]
pub enum SentryError {
    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SentryError>;
