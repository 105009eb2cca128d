//! Maps free-form generated text to a single option letter.
//!
//! Text first goes through an anomaly filter that rejects degenerate output,
//! then through an ordered cascade of matchers where the first hit wins.
//! Nothing here ever guesses: text no tier can read is `unknown`.

pub mod anomaly;
pub mod matchers;

pub use anomaly::*;
pub use matchers::*;

use modelverse_core::{BenchmarkKind, ExtractedChoice};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct AnswerExtractor {
    letters: Vec<char>,
    filter: AnomalyFilter,
}

impl AnswerExtractor {
    /// `letters` are the valid option letters in presentation order.
    pub fn new(letters: &[char]) -> Self {
        Self {
            letters: letters.iter().map(|c| c.to_ascii_uppercase()).collect(),
            filter: AnomalyFilter::default(),
        }
    }

    pub fn for_benchmark(benchmark: BenchmarkKind) -> Self {
        Self::new(benchmark.option_letters())
    }

    pub fn with_filter(mut self, filter: AnomalyFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn letters(&self) -> &[char] {
        &self.letters
    }

    pub fn extract(&self, text: &str) -> ExtractedChoice {
        self.extract_with_tier(text).0
    }

    /// Like [`extract`](Self::extract), also naming the tier that matched.
    pub fn extract_with_tier(&self, text: &str) -> (ExtractedChoice, Option<MatchTier>) {
        let text = text.trim();

        if let Some(anomaly) = self.filter.check(text) {
            trace!(?anomaly, "response rejected by anomaly filter");
            return (ExtractedChoice::Unknown, None);
        }

        for tier in MatchTier::CASCADE {
            if let Some(letter) = tier.apply(text, &self.letters) {
                trace!(%tier, %letter, "answer extracted");
                return (ExtractedChoice::Letter(letter), Some(tier));
            }
        }

        (ExtractedChoice::Unknown, None)
    }
}
