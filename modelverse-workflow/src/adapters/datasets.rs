use async_trait::async_trait;
use modelverse_core::{BenchmarkKind, CoreError, DatasetProvider, Result, Sample, Subset, OPTION_LETTERS};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads locally cached benchmark data: one `<subject>.json` file per
/// subject, each a JSON array of rows.
///
/// Rows follow the upstream layouts: `choices` or `options` for the option
/// texts, and the answer as an index (`answer: 2`, `answer_index: 2`) or a
/// letter (`answer: "C"`).
#[derive(Debug, Clone, Default)]
pub struct JsonDatasetProvider {
    dirs: HashMap<BenchmarkKind, PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default)]
    question: String,
    #[serde(default, alias = "options")]
    choices: Vec<String>,
    #[serde(default)]
    answer: Option<RawAnswer>,
    #[serde(default)]
    answer_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    Index(i64),
    Letter(String),
}

impl RawRow {
    /// Rows whose answer cannot be read get index -1 and are rejected
    /// later by sample validation.
    fn into_sample(self) -> Sample {
        let index = match (self.answer_index, self.answer) {
            (Some(index), _) => index,
            (None, Some(RawAnswer::Index(index))) => index,
            (None, Some(RawAnswer::Letter(letter))) => letter_index(&letter).unwrap_or(-1),
            (None, None) => -1,
        };
        Sample::new(self.question, self.choices, index)
    }
}

fn letter_index(letter: &str) -> Option<i64> {
    let mut chars = letter.trim().chars();
    let c = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() {
        return None;
    }
    OPTION_LETTERS
        .iter()
        .position(|l| *l == c)
        .map(|index| index as i64)
}

impl JsonDatasetProvider {
    pub fn new(dirs: HashMap<BenchmarkKind, PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn with_dir(mut self, benchmark: BenchmarkKind, dir: impl Into<PathBuf>) -> Self {
        self.dirs.insert(benchmark, dir.into());
        self
    }

    async fn load_subject(path: &Path) -> Result<Vec<Sample>> {
        let raw = tokio::fs::read_to_string(path).await?;
        let rows: Vec<RawRow> = serde_json::from_str(&raw)?;
        Ok(rows.into_iter().map(RawRow::into_sample).collect())
    }
}

#[async_trait]
impl DatasetProvider for JsonDatasetProvider {
    async fn load(&self, benchmark: BenchmarkKind) -> Result<Vec<Subset>> {
        let dir = self.dirs.get(&benchmark).ok_or_else(|| {
            CoreError::Configuration(format!(
                "no dataset directory configured for {benchmark} (export {} as per-subject JSON)",
                benchmark.hub_path()
            ))
        })?;

        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            CoreError::Configuration(format!("dataset directory {}: {e}", dir.display()))
        })?;

        let mut subsets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(subject) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match Self::load_subject(&path).await {
                Ok(samples) => {
                    debug!(subject, samples = samples.len(), "loaded subject");
                    subsets.push(Subset::new(subject, samples));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable subject file"),
            }
        }

        Ok(subsets)
    }
}
