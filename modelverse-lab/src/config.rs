use anyhow::{Context as _, Result};
use config::{Config as ConfigLoader, Environment, File};
use modelverse_core::BenchmarkKind;
use modelverse_workflow::{EvaluationSettings, SupervisorSettings};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "modelverse=info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluationSection {
    pub results_dir: PathBuf,
    pub dataset_timeout_ms: u64,
    pub max_consecutive_errors: usize,
    pub request_timeout_secs: u64,
    pub seed: u64,
    /// Generation endpoint evaluations are sent to
    pub api_base: String,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        let settings = EvaluationSettings::default();
        Self {
            results_dir: settings.results_dir,
            dataset_timeout_ms: settings.dataset_timeout_ms,
            max_consecutive_errors: settings.max_consecutive_errors,
            request_timeout_secs: 60,
            seed: 42,
            api_base: "http://127.0.0.1:8000".to_string(),
        }
    }
}

impl EvaluationSection {
    pub fn settings(&self) -> EvaluationSettings {
        EvaluationSettings {
            results_dir: self.results_dir.clone(),
            dataset_timeout_ms: self.dataset_timeout_ms,
            max_consecutive_errors: self.max_consecutive_errors,
        }
    }
}

/// A locally available model. Kept as a list because config keys are
/// case-folded and model ids are not.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelEntry {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub supervisor: SupervisorSettings,
    pub evaluation: EvaluationSection,
    pub models: Vec<ModelEntry>,
    /// Benchmark name to local data directory
    pub datasets: HashMap<String, PathBuf>,
}

impl AppConfig {
    /// Layered load: `<dir>/default`, `<dir>/local`, an optional explicit
    /// file, then `MODELVERSE__SECTION__KEY` environment variables.
    pub fn load(config_dir: &Path, file: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigLoader::builder()
            .add_source(File::with_name(&config_dir.join("default").to_string_lossy()).required(false))
            .add_source(File::with_name(&config_dir.join("local").to_string_lossy()).required(false));
        if let Some(file) = file {
            builder = builder.add_source(File::from(file).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("MODELVERSE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("failed to read configuration")?;

        config
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn model_paths(&self) -> HashMap<String, PathBuf> {
        self.models
            .iter()
            .map(|entry| (entry.id.clone(), entry.path.clone()))
            .collect()
    }

    pub fn dataset_dirs(&self) -> Result<HashMap<BenchmarkKind, PathBuf>> {
        self.datasets
            .iter()
            .map(|(name, dir)| {
                let benchmark = name
                    .parse::<BenchmarkKind>()
                    .map_err(|e| anyhow::anyhow!("datasets.{name}: {e}"))?;
                Ok((benchmark, dir.clone()))
            })
            .collect()
    }
}
