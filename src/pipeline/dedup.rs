use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::core::types::ContentRecord;

/// Outcome of offering content to the index.
#[derive(Debug, Clone)]
pub enum Admission {
    /// First time this content was seen; a record now exists for it.
    Fresh(ContentRecord),
    /// Identical content was admitted earlier in this run.
    Duplicate {
        content_hash: String,
        first_seen_url: String,
    },
}

/// Run-scoped content-hash index.
///
/// The membership check and insert happen under one lock, so two workers
/// finishing identical pages at the same instant can never both mint a
/// record.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: Mutex<HashMap<String, String>>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// SHA-256 over the normalized text's UTF-8 bytes, hex-encoded.
    pub fn content_hash(text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }

    pub fn admit(&self, normalized_text: &str, source_url: &str) -> Admission {
        let hash = Self::content_hash(normalized_text);
        let mut seen = self.seen.lock().unwrap();
        match seen.entry(hash.clone()) {
            Entry::Occupied(entry) => Admission::Duplicate {
                content_hash: hash,
                first_seen_url: entry.get().clone(),
            },
            Entry::Vacant(entry) => {
                entry.insert(source_url.to_string());
                Admission::Fresh(ContentRecord {
                    content_hash: hash,
                    normalized_text: normalized_text.to_string(),
                    source_url: source_url.to_string(),
                    first_seen: chrono::Utc::now(),
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
