//! Transformer classifier: a BERT-family sequence-classification model run
//! locally through candle.
//!
//! The model and tokenizer are loaded exactly once per run, from a local
//! directory or from the HuggingFace Hub, and are read-only afterwards. Any
//! load failure is fatal at startup.
//!
//! Truncation policy: inputs longer than the configured sequence length are
//! truncated from the END, keeping the leading tokens. Page openings carry
//! the title and lead paragraphs, which dominate triage accuracy for long
//! documents.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use crate::classify::labels::{canonical_argmax, ThreatLabel, LABEL_COUNT};
use crate::classify::TextClassifier;
use crate::core::errors::{Result, SentryError};
use crate::core::types::{ModelSource, Verdict};

/// BERT encoder plus linear classification head over the CLS position.
pub struct DeepClassifier {
    tokenizer: Tokenizer,
    model: BertModel,
    head: candle_nn::Linear,
    device: Device,
    /// Model output index -> triage label, derived from `id2label`.
    label_order: [ThreatLabel; LABEL_COUNT],
    max_seq_len: usize,
}

impl DeepClassifier {
    /// Load from a local directory containing `config.json`,
    /// `tokenizer.json` and `model.safetensors`.
    pub fn from_dir(dir: &Path, max_seq_len: usize) -> Result<Self> {
        Self::from_files(
            &dir.join("config.json"),
            &dir.join("tokenizer.json"),
            &dir.join("model.safetensors"),
            max_seq_len,
        )
    }

    /// Download from the HuggingFace Hub (cached on disk) and load.
    pub async fn from_hub(
        model_id: &str,
        cache_dir: Option<&Path>,
        max_seq_len: usize,
    ) -> Result<Self> {
        use hf_hub::api::tokio::{Api, ApiBuilder};

        let api = match cache_dir {
            Some(dir) => ApiBuilder::new()
                .with_cache_dir(PathBuf::from(dir))
                .build(),
            None => Api::new(),
        }
        .map_err(|e| SentryError::ModelLoad(format!("failed to create hub client: {e}")))?;

        let repo = api.model(model_id.to_string());
        let config_path = repo
            .get("config.json")
            .await
            .map_err(|e| SentryError::ModelLoad(format!("failed to download config.json: {e}")))?;
        let tokenizer_path = repo.get("tokenizer.json").await.map_err(|e| {
            SentryError::ModelLoad(format!("failed to download tokenizer.json: {e}"))
        })?;
        let weights_path = repo.get("model.safetensors").await.map_err(|e| {
            SentryError::ModelLoad(format!("failed to download model.safetensors: {e}"))
        })?;

        let classifier = Self::from_files(&config_path, &tokenizer_path, &weights_path, max_seq_len)?;
        tracing::info!(model_id = %model_id, "deep classifier loaded");
        Ok(classifier)
    }

    fn from_files(
        config_path: &Path,
        tokenizer_path: &Path,
        weights_path: &Path,
        max_seq_len: usize,
    ) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| SentryError::ModelLoad(format!("failed to read config.json: {e}")))?;
        let config_json: serde_json::Value = serde_json::from_str(&config_str)
            .map_err(|e| SentryError::ModelLoad(format!("failed to parse config.json: {e}")))?;

        let config: BertConfig = serde_json::from_value(config_json.clone())
            .map_err(|e| SentryError::ModelLoad(format!("invalid BERT config: {e}")))?;

        let label_order = label_order_from_config(&config_json)?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| SentryError::ModelLoad(format!("failed to load tokenizer: {e}")))?;

        let device = Device::Cpu;
        // SAFETY: memory-mapping safetensors is the standard candle pattern.
        // The file is read-only and remains valid for the lifetime of VarBuilder.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.to_path_buf()], DType::F32, &device)
                .map_err(|e| SentryError::ModelLoad(format!("failed to load weights: {e}")))?
        };

        let model = BertModel::load(vb.pp("bert"), &config)
            .map_err(|e| SentryError::ModelLoad(format!("failed to load BERT model: {e}")))?;

        let head = candle_nn::linear(config.hidden_size, LABEL_COUNT, vb.pp("classifier"))
            .map_err(|e| SentryError::ModelLoad(format!("failed to load classifier head: {e}")))?;

        Ok(Self {
            tokenizer,
            model,
            head,
            device,
            label_order,
            max_seq_len,
        })
    }

    /// Classify a batch of texts with one padded forward pass.
    ///
    /// Batching amortizes the per-pass overhead and is the main throughput
    /// lever for the run; `classify` is the batch of one.
    pub fn classify_batch(&self, texts: &[&str]) -> Result<Vec<Verdict>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut encoded: Vec<(Vec<u32>, Vec<u32>, Vec<u32>)> = Vec::with_capacity(texts.len());
        for text in texts {
            let encoding = self
                .tokenizer
                .encode(*text, true)
                .map_err(|e| SentryError::Classification(format!("tokenization failed: {e}")))?;
            encoded.push((
                truncate_tail(encoding.get_ids(), self.max_seq_len),
                truncate_tail(encoding.get_type_ids(), self.max_seq_len),
                truncate_tail(encoding.get_attention_mask(), self.max_seq_len),
            ));
        }

        let width = encoded.iter().map(|(ids, _, _)| ids.len()).max().unwrap_or(1);
        let batch = encoded.len();

        let mut flat_ids = Vec::with_capacity(batch * width);
        let mut flat_types = Vec::with_capacity(batch * width);
        let mut flat_mask = Vec::with_capacity(batch * width);
        for (ids, types, mask) in &encoded {
            flat_ids.extend(padded(ids, width));
            flat_types.extend(padded(types, width));
            flat_mask.extend(padded(mask, width));
        }

        let input_ids = Tensor::from_vec(flat_ids, (batch, width), &self.device)
            .map_err(|e| SentryError::Classification(format!("tensor creation failed: {e}")))?;
        let token_type_ids = Tensor::from_vec(flat_types, (batch, width), &self.device)
            .map_err(|e| SentryError::Classification(format!("tensor creation failed: {e}")))?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch, width), &self.device)
            .map_err(|e| SentryError::Classification(format!("tensor creation failed: {e}")))?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| SentryError::Classification(format!("model forward failed: {e}")))?;

        // CLS token sits at position 0.
        let cls = hidden
            .i((.., 0))
            .map_err(|e| SentryError::Classification(format!("CLS extraction failed: {e}")))?;
        let logits = candle_nn::Module::forward(&self.head, &cls)
            .map_err(|e| SentryError::Classification(format!("head forward failed: {e}")))?;
        let probs = candle_nn::ops::softmax(&logits, candle_core::D::Minus1)
            .map_err(|e| SentryError::Classification(format!("softmax failed: {e}")))?;
        let rows: Vec<Vec<f32>> = probs
            .to_vec2()
            .map_err(|e| SentryError::Classification(format!("probability extraction failed: {e}")))?;

        Ok(rows
            .iter()
            .map(|row| {
                let canonical = canonical_probs(row, &self.label_order);
                let (label, confidence) = canonical_argmax(&canonical);
                Verdict {
                    label,
                    confidence,
                    source: ModelSource::Deep,
                }
            })
            .collect())
    }
}

impl TextClassifier for DeepClassifier {
    fn source(&self) -> ModelSource {
        ModelSource::Deep
    }

    fn classify(&self, text: &str) -> Result<Verdict> {
        let mut verdicts = self.classify_batch(&[text])?;
        verdicts
            .pop()
            .ok_or_else(|| SentryError::Classification("empty batch result".to_string()))
    }
}

/// Keep the first `max` elements; the tail is dropped so leading context
/// survives truncation.
fn truncate_tail(values: &[u32], max: usize) -> Vec<u32> {
    values[..values.len().min(max)].to_vec()
}

fn padded(values: &[u32], width: usize) -> Vec<u32> {
    let mut out = values.to_vec();
    out.resize(width, 0);
    out
}

/// Reorder one row of model-order probabilities into canonical label order.
pub(crate) fn canonical_probs(
    row: &[f32],
    label_order: &[ThreatLabel; LABEL_COUNT],
) -> [f64; LABEL_COUNT] {
    let mut canonical = [0.0_f64; LABEL_COUNT];
    for (model_idx, label) in label_order.iter().enumerate() {
        canonical[label.canonical_index()] = f64::from(row.get(model_idx).copied().unwrap_or(0.0));
    }
    canonical
}

/// Derive the model-index -> label mapping from the config's `id2label`.
///
/// The model must cover exactly the four triage labels; anything else is a
/// startup error rather than a silent mislabeling.
fn label_order_from_config(config_json: &serde_json::Value) -> Result<[ThreatLabel; LABEL_COUNT]> {
    let map = config_json
        .get("id2label")
        .and_then(|v| v.as_object())
        .ok_or_else(|| {
            SentryError::ModelLoad("model config is missing the id2label mapping".to_string())
        })?;

    if map.len() != LABEL_COUNT {
        return Err(SentryError::ModelLoad(format!(
            "model defines {} labels, expected {LABEL_COUNT}",
            map.len()
        )));
    }

    let mut order = [ThreatLabel::Benign; LABEL_COUNT];
    let mut seen = [false; LABEL_COUNT];
    for (key, value) in map {
        let idx: usize = key.parse().map_err(|_| {
            SentryError::ModelLoad(format!("id2label key {key:?} is not an index"))
        })?;
        if idx >= LABEL_COUNT {
            return Err(SentryError::ModelLoad(format!(
                "id2label index {idx} out of range"
            )));
        }
        let raw = value.as_str().ok_or_else(|| {
            SentryError::ModelLoad(format!("id2label entry {key} is not a string"))
        })?;
        let label = ThreatLabel::parse_model_label(raw).ok_or_else(|| {
            SentryError::ModelLoad(format!("unrecognized model label {raw:?}"))
        })?;
        if seen[label.canonical_index()] {
            return Err(SentryError::ModelLoad(format!(
                "model label {label} appears more than once"
            )));
        }
        seen[label.canonical_index()] = true;
        order[idx] = label;
    }
    Ok(order)
}
