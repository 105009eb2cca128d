use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Why a response was rejected before matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anomaly {
    PunctuationDensity,
    DegenerateRepetition,
    SeparatorSpam,
}

/// Rejects degenerate generations so they score as `unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFilter {
    /// Maximum share of ASCII punctuation for text longer than 5 chars
    pub max_punctuation_ratio: f64,
    pub forbidden_separator: char,
    pub max_separator_count: usize,
}

impl Default for AnomalyFilter {
    fn default() -> Self {
        Self {
            max_punctuation_ratio: 0.5,
            forbidden_separator: ';',
            max_separator_count: 5,
        }
    }
}

impl AnomalyFilter {
    pub fn check(&self, text: &str) -> Option<Anomaly> {
        let len = text.chars().count();

        if len > 5 {
            let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
            if punctuation as f64 / len as f64 > self.max_punctuation_ratio {
                return Some(Anomaly::PunctuationDensity);
            }
        }

        if len > 3 {
            let distinct = text.chars().collect::<HashSet<_>>().len();
            let floor = (len as f64 / 2.0).min(3.0);
            if (distinct as f64) < floor {
                return Some(Anomaly::DegenerateRepetition);
            }
        }

        let separators = text
            .chars()
            .filter(|c| *c == self.forbidden_separator)
            .count();
        if separators > self.max_separator_count {
            return Some(Anomaly::SeparatorSpam);
        }

        None
    }

    pub fn is_anomalous(&self, text: &str) -> bool {
        self.check(text).is_some()
    }
}
