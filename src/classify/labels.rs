use serde::{Deserialize, Serialize};

pub const LABEL_COUNT: usize = 4;

/// Triage categories for harvested page content.
///
/// Enum order is the canonical tie-break order: when two labels score
/// exactly the same, the one appearing earlier here wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLabel {
    Benign,
    SqlInjection,
    Xss,
    CommandInjection,
}

impl ThreatLabel {
    pub const CANONICAL: [ThreatLabel; LABEL_COUNT] = [
        ThreatLabel::Benign,
        ThreatLabel::SqlInjection,
        ThreatLabel::Xss,
        ThreatLabel::CommandInjection,
    ];

    pub fn canonical_index(self) -> usize {
        match self {
            Self::Benign => 0,
            Self::SqlInjection => 1,
            Self::Xss => 2,
            Self::CommandInjection => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Benign => "benign",
            Self::SqlInjection => "sql_injection",
            Self::Xss => "xss",
            Self::CommandInjection => "command_injection",
        }
    }

    /// Tolerant parsing of label strings as they appear in model configs
    /// (`id2label` values vary across fine-tunes).
    pub fn parse_model_label(s: &str) -> Option<ThreatLabel> {
        let lower = s.trim().to_lowercase();
        if lower.contains("sql") {
            Some(Self::SqlInjection)
        } else if lower.contains("xss") || lower.contains("cross_site") || lower.contains("cross-site") {
            Some(Self::Xss)
        } else if lower.contains("cmd") || lower.contains("command") || lower.contains("shell") {
            Some(Self::CommandInjection)
        } else if lower.contains("benign") || lower.contains("safe") || lower.contains("normal") {
            Some(Self::Benign)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ThreatLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Argmax over canonical-order probabilities with the canonical tie-break:
/// only a strictly greater probability displaces an earlier label.
pub fn canonical_argmax(probs: &[f64; LABEL_COUNT]) -> (ThreatLabel, f64) {
    let mut best = 0;
    for (i, p) in probs.iter().enumerate().skip(1) {
        if *p > probs[best] {
            best = i;
        }
    }
    (ThreatLabel::CANONICAL[best], probs[best])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_matches_indices() {
        for (i, label) in ThreatLabel::CANONICAL.iter().enumerate() {
            assert_eq!(label.canonical_index(), i);
        }
    }

    #[test]
    fn test_argmax_picks_largest() {
        let (label, conf) = canonical_argmax(&[0.1, 0.2, 0.6, 0.1]);
        assert_eq!(label, ThreatLabel::Xss);
        assert!((conf - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_argmax_exact_tie_goes_to_earlier_label() {
        let (label, _) = canonical_argmax(&[0.4, 0.4, 0.1, 0.1]);
        assert_eq!(label, ThreatLabel::Benign);

        let (label, _) = canonical_argmax(&[0.1, 0.4, 0.4, 0.1]);
        assert_eq!(label, ThreatLabel::SqlInjection);
    }

    #[test]
    fn test_parse_model_label_synonyms() {
        assert_eq!(
            ThreatLabel::parse_model_label("SQL_INJECTION"),
            Some(ThreatLabel::SqlInjection)
        );
        assert_eq!(ThreatLabel::parse_model_label("safe"), Some(ThreatLabel::Benign));
        assert_eq!(ThreatLabel::parse_model_label("XSS"), Some(ThreatLabel::Xss));
        assert_eq!(
            ThreatLabel::parse_model_label("shell_command"),
            Some(ThreatLabel::CommandInjection)
        );
        assert_eq!(ThreatLabel::parse_model_label("LABEL_3"), None);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&ThreatLabel::SqlInjection).unwrap();
        assert_eq!(json, "\"sql_injection\"");
    }
}
