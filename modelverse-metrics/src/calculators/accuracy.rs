use modelverse_core::{Answer, BenchmarkKind, ExtractedChoice, Sample};

use crate::extraction::{AnswerExtractor, MatchTier};

/// Scores one generated response against a sample's correct letter.
#[derive(Debug, Clone)]
pub struct AccuracyCalculator {
    extractor: AnswerExtractor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredChoice {
    pub choice: ExtractedChoice,
    pub tier: Option<MatchTier>,
    pub is_correct: bool,
}

impl AccuracyCalculator {
    pub fn new(extractor: AnswerExtractor) -> Self {
        Self { extractor }
    }

    pub fn for_benchmark(benchmark: BenchmarkKind) -> Self {
        Self::new(AnswerExtractor::for_benchmark(benchmark))
    }

    pub fn letters(&self) -> &[char] {
        self.extractor.letters()
    }

    pub fn score(&self, response: &str, correct: char) -> ScoredChoice {
        let (choice, tier) = self.extractor.extract_with_tier(response);
        ScoredChoice {
            choice,
            tier,
            is_correct: choice.matches(correct),
        }
    }

    /// Score a response to `sample` and build the recorded [`Answer`].
    /// Returns `None` when the sample's correct index has no letter.
    pub fn answer(&self, sample: &Sample, response: String, latency_secs: f64) -> Option<Answer> {
        let correct = sample.correct_letter(self.letters())?;
        let scored = self.score(&response, correct);
        Some(Answer::new(
            sample.question.clone(),
            sample.choices.clone(),
            response,
            scored.choice,
            correct,
            latency_secs,
        ))
    }
}

/// `correct / total`, or 0 when nothing was attempted.
pub fn accuracy(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

/// Unweighted mean of per-group accuracies.
pub fn macro_average(accuracies: &[f64]) -> f64 {
    if accuracies.is_empty() {
        0.0
    } else {
        accuracies.iter().sum::<f64>() / accuracies.len() as f64
    }
}
