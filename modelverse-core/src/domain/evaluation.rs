use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use super::config::BenchmarkKind;

/// Sentinel written wherever no option letter could be determined.
pub const UNKNOWN_CHOICE: &str = "unknown";

// ===== Extracted Choice =====

/// Result of answer extraction: one option letter, or the `unknown` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractedChoice {
    Letter(char),
    Unknown,
}

impl ExtractedChoice {
    pub fn letter(&self) -> Option<char> {
        match self {
            ExtractedChoice::Letter(letter) => Some(*letter),
            ExtractedChoice::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ExtractedChoice::Unknown)
    }

    /// `unknown` never matches, whatever the expected letter is.
    pub fn matches(&self, expected: char) -> bool {
        self.letter() == Some(expected)
    }
}

impl std::fmt::Display for ExtractedChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractedChoice::Letter(letter) => write!(f, "{letter}"),
            ExtractedChoice::Unknown => f.write_str(UNKNOWN_CHOICE),
        }
    }
}

impl Serialize for ExtractedChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExtractedChoice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == UNKNOWN_CHOICE {
            return Ok(ExtractedChoice::Unknown);
        }
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) if letter.is_ascii_uppercase() => {
                Ok(ExtractedChoice::Letter(letter))
            }
            _ => Err(serde::de::Error::custom(format!(
                "expected an option letter or \"{UNKNOWN_CHOICE}\", got {raw:?}"
            ))),
        }
    }
}

// ===== Answer =====

/// One attempted sample. Appended once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub question: String,
    pub choices: Vec<String>,
    pub model_response: String,
    #[serde(rename = "model_choice")]
    pub extracted_choice: ExtractedChoice,
    #[serde(rename = "correct_answer")]
    pub correct_choice: char,
    pub is_correct: bool,
    /// Generation latency in seconds
    #[serde(rename = "response_time")]
    pub latency_secs: f64,
}

impl Answer {
    pub fn new(
        question: String,
        choices: Vec<String>,
        model_response: String,
        extracted_choice: ExtractedChoice,
        correct_choice: char,
        latency_secs: f64,
    ) -> Self {
        let is_correct = extracted_choice.matches(correct_choice);
        Self {
            question,
            choices,
            model_response,
            extracted_choice,
            correct_choice,
            is_correct,
            latency_secs,
        }
    }
}

// ===== Subject Result =====

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectResult {
    pub subject: String,
    pub correct: usize,
    pub total: usize,
    pub unknown_count: usize,
    pub answers: Vec<Answer>,
}

impl SubjectResult {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            correct: 0,
            total: 0,
            unknown_count: 0,
            answers: Vec::new(),
        }
    }

    pub fn record(&mut self, answer: Answer) {
        self.total += 1;
        if answer.is_correct {
            self.correct += 1;
        }
        if answer.extracted_choice.is_unknown() {
            self.unknown_count += 1;
        }
        self.answers.push(answer);
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }

    pub fn unknown_rate(&self) -> f64 {
        ratio(self.unknown_count, self.total)
    }

    fn to_artifact(&self) -> SubjectArtifact {
        SubjectArtifact {
            accuracy: self.accuracy(),
            correct: self.correct,
            total: self.total,
            unknown_count: self.unknown_count,
            unknown_rate: self.unknown_rate(),
            answers: self.answers.clone(),
        }
    }
}

// ===== Evaluation Result =====

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub benchmark: BenchmarkKind,
    pub subjects: Vec<SubjectResult>,
    /// Samples whose generation call failed; they are not trials
    pub sample_errors: usize,
}

impl EvaluationResult {
    pub fn new(benchmark: BenchmarkKind) -> Self {
        Self {
            benchmark,
            subjects: Vec::new(),
            sample_errors: 0,
        }
    }

    pub fn push(&mut self, subject: SubjectResult) {
        self.subjects.push(subject);
    }

    pub fn total_correct(&self) -> usize {
        self.subjects.iter().map(|s| s.correct).sum()
    }

    pub fn total_questions(&self) -> usize {
        self.subjects.iter().map(|s| s.total).sum()
    }

    pub fn total_unknown(&self) -> usize {
        self.subjects.iter().map(|s| s.unknown_count).sum()
    }

    /// Σcorrect / Σtotal across subjects
    pub fn micro_accuracy(&self) -> f64 {
        ratio(self.total_correct(), self.total_questions())
    }

    /// Mean of per-subject accuracies
    pub fn macro_accuracy(&self) -> f64 {
        if self.subjects.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.subjects.iter().map(SubjectResult::accuracy).sum();
        sum / self.subjects.len() as f64
    }

    pub fn unknown_rate(&self) -> f64 {
        ratio(self.total_unknown(), self.total_questions())
    }

    pub fn to_artifact(&self) -> ResultArtifact {
        ResultArtifact {
            benchmark: self.benchmark.display_name().to_string(),
            average_accuracy: self.macro_accuracy(),
            overall_accuracy: self.micro_accuracy(),
            total_correct: self.total_correct(),
            total_questions: self.total_questions(),
            unknown_rate: self.unknown_rate(),
            sample_errors: self.sample_errors,
            subject_results: self
                .subjects
                .iter()
                .map(|s| (s.subject.clone(), s.to_artifact()))
                .collect(),
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

// ===== Result Artifact =====

/// On-disk JSON schema of an evaluation result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultArtifact {
    pub benchmark: String,
    /// Macro accuracy
    pub average_accuracy: f64,
    /// Micro accuracy
    pub overall_accuracy: f64,
    pub total_correct: usize,
    pub total_questions: usize,
    pub unknown_rate: f64,
    pub sample_errors: usize,
    pub subject_results: BTreeMap<String, SubjectArtifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectArtifact {
    pub accuracy: f64,
    pub correct: usize,
    pub total: usize,
    pub unknown_count: usize,
    pub unknown_rate: f64,
    pub answers: Vec<Answer>,
}

// ===== Metrics =====

/// Normalized metrics persisted on a task after a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metrics {
    /// Canonical accuracy: micro when available, otherwise macro
    pub accuracy: Option<f64>,
    pub overall_accuracy: Option<f64>,
    pub average_accuracy: Option<f64>,
    pub f1_score: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub perplexity: Option<f64>,
    pub bleu: Option<f64>,
    pub rouge: Option<f64>,
    pub exact_match: Option<f64>,
    pub custom_metrics: BTreeMap<String, f64>,
}

impl Metrics {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
