use serde::{Deserialize, Serialize};

/// A single multiple-choice item as delivered by the dataset provider.
///
/// `correct_index` is kept signed so malformed source rows survive loading
/// and are rejected by [`Sample::validate`] instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sample {
    pub question: String,
    pub choices: Vec<String>,
    pub correct_index: i64,
}

impl Sample {
    pub fn new(question: impl Into<String>, choices: Vec<String>, correct_index: i64) -> Self {
        Self {
            question: question.into(),
            choices,
            correct_index,
        }
    }

    /// Check that the sample can be scored against `letters`.
    pub fn validate(&self, letters: &[char]) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("question is empty".to_string());
        }
        if self.choices.is_empty() {
            return Err("no choices".to_string());
        }
        let bound = self.choices.len().min(letters.len());
        if self.correct_index < 0 || self.correct_index as usize >= bound {
            return Err(format!(
                "correct index {} outside 0..{}",
                self.correct_index, bound
            ));
        }
        Ok(())
    }

    /// Letter of the correct choice. Only meaningful after `validate`.
    pub fn correct_letter(&self, letters: &[char]) -> Option<char> {
        usize::try_from(self.correct_index)
            .ok()
            .and_then(|index| letters.get(index).copied())
    }
}

/// A named partition of benchmark samples, e.g. one MMLU subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subset {
    pub name: String,
    pub samples: Vec<Sample>,
}

impl Subset {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

    fn choices(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("choice {i}")).collect()
    }

    #[test]
    fn test_valid_sample() {
        let sample = Sample::new("2 + 2?", choices(4), 3);
        assert!(sample.validate(&LETTERS).is_ok());
        assert_eq!(sample.correct_letter(&LETTERS), Some('D'));
    }

    #[test]
    fn test_index_bounded_by_choice_count() {
        let sample = Sample::new("q", choices(3), 3);
        assert!(sample.validate(&LETTERS).is_err());
    }

    #[test]
    fn test_index_bounded_by_letter_count() {
        let sample = Sample::new("q", choices(6), 5);
        assert!(sample.validate(&LETTERS).is_err());
    }

    #[test]
    fn test_negative_index_rejected() {
        let sample = Sample::new("q", choices(4), -1);
        assert!(sample.validate(&LETTERS).is_err());
        assert_eq!(sample.correct_letter(&LETTERS), None);
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(Sample::new("  ", choices(4), 0).validate(&LETTERS).is_err());
        assert!(Sample::new("q", vec![], 0).validate(&LETTERS).is_err());
    }
}
