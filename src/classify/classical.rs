//! Pattern-and-statistics classifier: a fixed-dimensionality feature vector
//! feeding a linear layer and a softmax.
//!
//! # Feature Vector Layout (12 dimensions)
//!
//! | Index | Feature                                  | Type    |
//! |-------|------------------------------------------|---------|
//! | 0     | SQL-injection pattern present            | Binary  |
//! | 1     | XSS pattern present                      | Binary  |
//! | 2     | Command-injection pattern present        | Binary  |
//! | 3     | Fraction of SQL patterns matched         | Numeric |
//! | 4     | Fraction of XSS patterns matched         | Numeric |
//! | 5     | Fraction of command patterns matched     | Numeric |
//! | 6     | Text length (normalised, cap 10k chars)  | Numeric |
//! | 7     | Special character ratio                  | Numeric |
//! | 8     | Average word length (normalised)         | Numeric |
//! | 9     | Digit ratio                              | Numeric |
//! | 10    | Suspicious-term density                  | Numeric |
//! | 11    | Uppercase ratio                          | Numeric |

use std::path::Path;

use aho_corasick::AhoCorasick;
use regex::RegexSet;
use serde::Deserialize;

use crate::classify::labels::{canonical_argmax, LABEL_COUNT};
use crate::classify::{softmax, TextClassifier};
use crate::core::errors::{Result, SentryError};
use crate::core::types::{ModelSource, Verdict};

pub const FEATURE_DIM: usize = 12;

/// Maximum text length used for normalisation (characters).
const MAX_TEXT_LENGTH: f32 = 10_000.0;

const SQL_PATTERNS: &[&str] = &[
    r"(?i)union\s+select",
    r"(?i)\bsleep\s*\(",
    r"(?i)\bbenchmark\s*\(",
    r"(?i)information_schema",
    r"(?i)--\s*$",
    r"/\*.*?\*/",
    r"(?i)group_concat\s*\(",
];

const XSS_PATTERNS: &[&str] = &[
    r"(?i)<script[^>]*>",
    r"(?i)javascript:",
    r"(?i)\bon\w+\s*=",
    r"(?i)\beval\s*\(",
    r"(?i)document\.cookie",
];

const CMD_PATTERNS: &[&str] = &[
    r"(?i)\bsystem\s*\(",
    r"(?i)\bexec\s*\(",
    r"(?i)shell_exec\s*\(",
    r"`[^`]+`",
    r"\|\s*\w+",
];

/// Fixed vocabulary for the suspicious-term density feature.
const SUSPICIOUS_TERMS: &[&str] = &[
    "select", "union", "drop table", "password", "script", "alert(", "onerror", "iframe",
    "eval(", "base64", "curl", "wget", "/etc/passwd", "cmd.exe", "powershell", "rm -rf",
];

/// Deterministic text-to-feature-vector extractor. Stateless after build.
pub struct Vectorizer {
    sql: RegexSet,
    xss: RegexSet,
    cmd: RegexSet,
    vocab: AhoCorasick,
}

impl Vectorizer {
    pub fn new() -> Self {
        Self {
            sql: RegexSet::new(SQL_PATTERNS).unwrap(),
            xss: RegexSet::new(XSS_PATTERNS).unwrap(),
            cmd: RegexSet::new(CMD_PATTERNS).unwrap(),
            vocab: AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(SUSPICIOUS_TERMS)
                .unwrap(),
        }
    }

    pub fn features(&self, text: &str) -> [f32; FEATURE_DIM] {
        let mut x = [0.0_f32; FEATURE_DIM];
        if text.is_empty() {
            return x;
        }

        let sql_hits = self.sql.matches(text).iter().count();
        let xss_hits = self.xss.matches(text).iter().count();
        let cmd_hits = self.cmd.matches(text).iter().count();

        x[0] = if sql_hits > 0 { 1.0 } else { 0.0 };
        x[1] = if xss_hits > 0 { 1.0 } else { 0.0 };
        x[2] = if cmd_hits > 0 { 1.0 } else { 0.0 };
        x[3] = sql_hits as f32 / SQL_PATTERNS.len() as f32;
        x[4] = xss_hits as f32 / XSS_PATTERNS.len() as f32;
        x[5] = cmd_hits as f32 / CMD_PATTERNS.len() as f32;

        x[6] = (text.len() as f32 / MAX_TEXT_LENGTH).min(1.0);

        let total_chars = text.chars().count();
        let special = text
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();
        x[7] = special as f32 / total_chars as f32;

        let words: Vec<&str> = text.split_whitespace().collect();
        if !words.is_empty() {
            let total_word_len: usize = words.iter().map(|w| w.len()).sum();
            // Assume ~20 chars is the practical ceiling for a word.
            x[8] = (total_word_len as f32 / words.len() as f32) / 20.0;
        }

        let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
        x[9] = digits as f32 / total_chars as f32;

        let term_hits = self.vocab.find_iter(text).count();
        x[10] = (term_hits as f32 / words.len().max(1) as f32).min(1.0);

        let uppercase = text.chars().filter(|c| c.is_uppercase()).count();
        x[11] = uppercase as f32 / total_chars as f32;

        x
    }
}

impl Default for Vectorizer {
    fn default() -> Self {
        Self::new()
    }
}

// Fallback weight table distilled from an offline training run; ships inside
// the binary so the classical path needs no external file.
const BUILTIN_WEIGHTS: [[f32; FEATURE_DIM]; LABEL_COUNT] = [
    // benign
    [-2.5, -2.5, -2.5, -1.5, -1.5, -1.5, 0.2, -0.6, 0.1, -0.4, -1.2, -0.2],
    // sql_injection
    [4.0, 0.0, 0.4, 2.5, 0.0, 0.0, 0.0, 0.2, 0.0, 0.4, 0.9, 0.1],
    // xss
    [0.0, 4.0, 0.0, 0.0, 2.5, 0.0, 0.0, 0.5, 0.0, 0.0, 0.9, 0.0],
    // command_injection
    [0.0, 0.0, 4.0, 0.0, 0.0, 2.5, 0.0, 0.3, 0.0, 0.1, 0.9, 0.0],
];

const BUILTIN_BIAS: [f32; LABEL_COUNT] = [1.5, -1.2, -1.2, -1.2];

/// Linear softmax model over the feature vector. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassicalModel {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl ClassicalModel {
    pub fn builtin() -> Self {
        Self {
            weights: BUILTIN_WEIGHTS.iter().map(|row| row.to_vec()).collect(),
            bias: BUILTIN_BIAS.to_vec(),
        }
    }

    /// Load trained weights from a JSON file: `{"weights": [[..]], "bias": [..]}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SentryError::ModelLoad(format!("failed to read {}: {e}", path.display()))
        })?;
        let model: Self = serde_json::from_str(&raw).map_err(|e| {
            SentryError::ModelLoad(format!("failed to parse {}: {e}", path.display()))
        })?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.weights.len() != LABEL_COUNT || self.bias.len() != LABEL_COUNT {
            return Err(SentryError::ModelLoad(format!(
                "classical model must have {LABEL_COUNT} label rows, got {} weights / {} bias",
                self.weights.len(),
                self.bias.len()
            )));
        }
        for (i, row) in self.weights.iter().enumerate() {
            if row.len() != FEATURE_DIM {
                return Err(SentryError::ModelLoad(format!(
                    "classical weight row {i} has {} features, expected {FEATURE_DIM}",
                    row.len()
                )));
            }
        }
        Ok(())
    }

    fn logits(&self, x: &[f32; FEATURE_DIM]) -> [f32; LABEL_COUNT] {
        let mut out = [0.0_f32; LABEL_COUNT];
        for (label, row) in self.weights.iter().enumerate() {
            let dot: f32 = row.iter().zip(x.iter()).map(|(w, f)| w * f).sum();
            out[label] = dot + self.bias[label];
        }
        out
    }
}

/// Feature-vector classifier over the canonical label set.
pub struct ClassicalClassifier {
    vectorizer: Vectorizer,
    model: ClassicalModel,
}

impl ClassicalClassifier {
    pub fn new(model: ClassicalModel) -> Self {
        Self {
            vectorizer: Vectorizer::new(),
            model,
        }
    }

    pub fn builtin() -> Self {
        Self::new(ClassicalModel::builtin())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(ClassicalModel::from_file(path)?))
    }
}

impl TextClassifier for ClassicalClassifier {
    fn source(&self) -> ModelSource {
        ModelSource::Classical
    }

    fn classify(&self, text: &str) -> Result<Verdict> {
        let features = self.vectorizer.features(text);
        let logits = self.model.logits(&features);
        let probs = softmax(&logits);
        let mut canonical = [0.0_f64; LABEL_COUNT];
        canonical.copy_from_slice(&probs);
        let (label, confidence) = canonical_argmax(&canonical);
        Ok(Verdict {
            label,
            confidence,
            source: ModelSource::Classical,
        })
    }
}
