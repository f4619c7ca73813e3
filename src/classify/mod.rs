pub mod classical;
pub mod deep;
pub mod fusion;
pub mod labels;

use crate::core::errors::Result;
use crate::core::types::{ModelSource, Verdict};

/// The seam both classification models implement.
///
/// Implementations are read-only after construction and safe to share
/// across workers behind an `Arc` with no per-call locking.
pub trait TextClassifier: Send + Sync {
    fn source(&self) -> ModelSource;

    fn classify(&self, text: &str) -> Result<Verdict>;
}

/// Numerically stable softmax over raw logits.
pub(crate) fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f64> = logits.iter().map(|l| f64::from(l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, 4.0]);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(probs[3] > probs[2] && probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_uniform_on_equal_logits(){
        let probs = softmax(&[0.5, 0.5, 0.5, 0.5]);
        for p in probs {
            assert!((p - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn test_softmax_stable_on_large_logits() {
        let probs = softmax(&[1000.0, 999.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!(probs[0] > probs[1]);
    }
}
