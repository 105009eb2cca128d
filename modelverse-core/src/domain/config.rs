use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Option letters in presentation order. Benchmarks use a prefix of this.
pub const OPTION_LETTERS: [char; 10] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J'];

// ===== Sampling Parameters =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Validate)]
pub struct SamplingParams {
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub top_p: f32,
    #[validate(range(min = 1))]
    pub max_tokens: u32,
    #[validate(range(min = 0.0))]
    pub repetition_penalty: f32,
}

impl SamplingParams {
    /// Greedy decoding, used for benchmark runs
    pub fn greedy(max_tokens: u32) -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            max_tokens,
            repetition_penalty: 1.0,
        }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 2048,
            repetition_penalty: 1.1,
        }
    }
}

/// Per-call sampling overrides. Absent fields fall back to the task defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SamplingOverrides {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub repetition_penalty: Option<f32>,
}

impl SamplingOverrides {
    pub fn resolve(&self, defaults: &SamplingParams) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            repetition_penalty: self
                .repetition_penalty
                .unwrap_or(defaults.repetition_penalty),
        }
    }
}

// ===== Benchmarks =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkKind {
    #[default]
    Mmlu,
    MmluPro,
}

impl BenchmarkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkKind::Mmlu => "mmlu",
            BenchmarkKind::MmluPro => "mmlu_pro",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BenchmarkKind::Mmlu => "MMLU",
            BenchmarkKind::MmluPro => "MMLU-Pro",
        }
    }

    /// Upstream dataset location, informational only
    pub fn hub_path(&self) -> &'static str {
        match self {
            BenchmarkKind::Mmlu => "cais/mmlu",
            BenchmarkKind::MmluPro => "QwenLM/MMLU-Pro",
        }
    }

    pub fn option_count(&self) -> usize {
        match self {
            BenchmarkKind::Mmlu => 4,
            BenchmarkKind::MmluPro => 10,
        }
    }

    pub fn option_letters(&self) -> &'static [char] {
        &OPTION_LETTERS[..self.option_count()]
    }
}

impl std::fmt::Display for BenchmarkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BenchmarkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "mmlu" => Ok(BenchmarkKind::Mmlu),
            "mmlu_pro" => Ok(BenchmarkKind::MmluPro),
            other => Err(format!("unsupported benchmark: {other}")),
        }
    }
}

// ===== Inference Configuration =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServingLauncher {
    /// vLLM OpenAI-compatible API server
    #[default]
    Vllm,
    /// Arbitrary program. `{port}`, `{model}` and `{name}` in args are substituted.
    Custom { program: String, args: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct InferenceConfig {
    #[validate(length(min = 1))]
    pub model_id: String,
    #[validate(length(min = 1, max = 255))]
    pub served_model_name: String,
    pub port: Option<u16>,
    #[validate(range(min = 1))]
    pub tensor_parallel_size: u32,
    #[validate(range(min = 1))]
    pub max_model_len: u32,
    pub quantization: Option<String>,
    pub dtype: String,
    #[validate(nested)]
    pub sampling: SamplingParams,
    pub launcher: ServingLauncher,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            served_model_name: String::new(),
            port: None,
            tensor_parallel_size: 1,
            max_model_len: 4096,
            quantization: None,
            dtype: "auto".to_string(),
            sampling: SamplingParams::default(),
            launcher: ServingLauncher::Vllm,
            request_timeout_secs: 60,
        }
    }
}

impl InferenceConfig {
    pub fn new(model_id: impl Into<String>, served_model_name: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            served_model_name: served_model_name.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_launcher(mut self, launcher: ServingLauncher) -> Self {
        self.launcher = launcher;
        self
    }
}

// ===== Evaluation Configuration =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_sample_bounds"))]
pub struct EvaluationConfig {
    #[validate(length(min = 1))]
    pub model_id: String,
    #[validate(length(min = 1, max = 255))]
    pub served_model_name: String,
    pub benchmark: BenchmarkKind,
    #[validate(range(min = 1))]
    pub max_subjects: usize,
    #[validate(range(min = 1))]
    pub min_samples: usize,
    #[validate(range(min = 1))]
    pub max_samples: usize,
    #[validate(range(min = 0.0, max = 1.0))]
    pub sample_fraction: f64,
    pub seed: u64,
    #[validate(nested)]
    pub sampling: SamplingParams,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            served_model_name: String::new(),
            benchmark: BenchmarkKind::Mmlu,
            max_subjects: 5,
            min_samples: 5,
            max_samples: 20,
            sample_fraction: 0.1,
            seed: 42,
            sampling: SamplingParams::greedy(128),
            request_timeout_secs: 60,
        }
    }
}

impl EvaluationConfig {
    pub fn new(
        model_id: impl Into<String>,
        served_model_name: impl Into<String>,
        benchmark: BenchmarkKind,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            served_model_name: served_model_name.into(),
            benchmark,
            ..Self::default()
        }
    }

    /// Number of samples drawn from a subset of `subset_len` items
    pub fn sample_count(&self, subset_len: usize) -> usize {
        let proportional = (subset_len as f64 * self.sample_fraction).ceil() as usize;
        proportional
            .max(self.min_samples)
            .min(self.max_samples)
            .min(subset_len)
    }
}

fn validate_sample_bounds(config: &EvaluationConfig) -> Result<(), ValidationError> {
    if config.min_samples > config.max_samples {
        return Err(ValidationError::new("min_samples_exceeds_max_samples"));
    }
    Ok(())
}

// ===== Task Configuration =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskConfig {
    Inference(InferenceConfig),
    Evaluation(EvaluationConfig),
}

impl TaskConfig {
    pub fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            TaskConfig::Inference(config) => config.validate(),
            TaskConfig::Evaluation(config) => config.validate(),
        }
    }

    pub fn model_id(&self) -> &str {
        match self {
            TaskConfig::Inference(config) => &config.model_id,
            TaskConfig::Evaluation(config) => &config.model_id,
        }
    }
}
