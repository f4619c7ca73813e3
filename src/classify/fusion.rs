use crate::core::types::{ModelSource, Verdict};

/// Combines the classical and deep verdicts into the single fused decision.
///
/// Policy:
/// - Agreement on the label: fused confidence is the higher of the two.
/// - Disagreement: the strictly more confident verdict wins.
/// - Disagreement with confidences within `tie_epsilon`: the deep verdict
///   wins. The transformer sees word order and context the feature vector
///   cannot, so it is the documented default on a dead heat.
///
/// Pure and deterministic: identical inputs always fuse identically.
#[derive(Debug, Clone, Copy)]
pub struct FusionPolicy {
    tie_epsilon: f64,
}

impl FusionPolicy {
    pub fn new(tie_epsilon: f64) -> Self {
        Self { tie_epsilon }
    }

    pub fn tie_epsilon(&self) -> f64 {
        self.tie_epsilon
    }

    pub fn fuse(&self, classical: &Verdict, deep: &Verdict) -> Verdict {
        if classical.label == deep.label {
            return Verdict {
                label: deep.label,
                confidence: classical.confidence.max(deep.confidence),
                source: ModelSource::Fused,
            };
        }

        let winner = if (classical.confidence - deep.confidence).abs() <= self.tie_epsilon {
            deep
        } else if classical.confidence > deep.confidence {
            classical
        } else {
            deep
        };

        Verdict {
            label: winner.label,
            confidence: winner.confidence,
            source: ModelSource::Fused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::labels::ThreatLabel;

    fn verdict(label: ThreatLabel, confidence: f64, source: ModelSource) -> Verdict {
        Verdict {
            label,
            confidence,
            source,
        }
    }

    fn classical(label: ThreatLabel, confidence: f64) -> Verdict {
        verdict(label, confidence, ModelSource::Classical)
    }

    fn deep(label: ThreatLabel, confidence: f64) -> Verdict {
        verdict(label, confidence, ModelSource::Deep)
    }

    #[test]
    fn test_agreement_takes_max_confidence() {
        let policy = FusionPolicy::new(0.05);
        let fused = policy.fuse(
            &classical(ThreatLabel::Xss, 0.7),
            &deep(ThreatLabel::Xss, 0.9),
        );
        assert_eq!(fused.label, ThreatLabel::Xss);
        assert!((fused.confidence - 0.9).abs() < 1e-12);
        assert_eq!(fused.source, ModelSource::Fused);
    }

    #[test]
    fn test_disagreement_higher_confidence_wins() {
        let policy = FusionPolicy::new(0.05);
        let fused = policy.fuse(
            &classical(ThreatLabel::SqlInjection, 0.95),
            &deep(ThreatLabel::Benign, 0.6),
        );
        assert_eq!(fused.label, ThreatLabel::SqlInjection);
        assert!((fused.confidence - 0.95).abs() < 1e-12);

        let fused = policy.fuse(
            &classical(ThreatLabel::SqlInjection, 0.6),
            &deep(ThreatLabel::Benign, 0.95),
        );
        assert_eq!(fused.label, ThreatLabel::Benign);
    }

    #[test]
    fn test_tie_within_epsilon_defaults_to_deep() {
        let policy = FusionPolicy::new(0.05);
        let fused = policy.fuse(
            &classical(ThreatLabel::SqlInjection, 0.83),
            &deep(ThreatLabel::Benign, 0.80),
        );
        assert_eq!(fused.label, ThreatLabel::Benign);
        assert!((fused.confidence - 0.80).abs() < 1e-12);
    }

    #[test]
    fn test_exact_tie_defaults_to_deep_even_with_zero_epsilon() {
        let policy = FusionPolicy::new(0.0);
        let fused = policy.fuse(
            &classical(ThreatLabel::Xss, 0.75),
            &deep(ThreatLabel::CommandInjection, 0.75),
        );
        assert_eq!(fused.label, ThreatLabel::CommandInjection);
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let policy = FusionPolicy::new(0.05);
        let c = classical(ThreatLabel::Xss, 0.81);
        let d = deep(ThreatLabel::Benign, 0.79);
        let first = policy.fuse(&c, &d);
        for _ in 0..10 {
            let again = policy.fuse(&c, &d);
            assert_eq!(again.label, first.label);
            assert_eq!(again.confidence, first.confidence);
        }
    }

    #[test]
    fn test_fused_source_always_fused() {
        let policy = FusionPolicy::new(0.05);
        let fused = policy.fuse(
            &classical(ThreatLabel::Benign, 0.9),
            &deep(ThreatLabel::Benign, 0.4),
        );
        assert_eq!(fused.source, ModelSource::Fused);
    }
}
