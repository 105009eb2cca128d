use modelverse_core::{InferenceConfig, ServingLauncher};
use std::path::Path;

/// Program and arguments used to launch a serving process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ServeCommand {
    pub fn build(config: &InferenceConfig, model_path: &Path, port: u16, python: &str) -> Self {
        let model = model_path.to_string_lossy().to_string();
        match &config.launcher {
            ServingLauncher::Vllm => Self::vllm(config, &model, port, python),
            ServingLauncher::Custom { program, args } => Self {
                program: program.clone(),
                args: args
                    .iter()
                    .map(|arg| {
                        arg.replace("{port}", &port.to_string())
                            .replace("{model}", &model)
                            .replace("{name}", &config.served_model_name)
                    })
                    .collect(),
            },
        }
    }

    fn vllm(config: &InferenceConfig, model: &str, port: u16, python: &str) -> Self {
        let mut args: Vec<String> = vec![
            "-m".into(),
            "vllm.entrypoints.openai.api_server".into(),
            "--model".into(),
            model.into(),
            "--host".into(),
            "0.0.0.0".into(),
            "--port".into(),
            port.to_string(),
            "--tensor-parallel-size".into(),
            config.tensor_parallel_size.to_string(),
            "--max-model-len".into(),
            config.max_model_len.to_string(),
            "--served-model-name".into(),
            config.served_model_name.clone(),
            "--disable-log-requests".into(),
            "--trust-remote-code".into(),
        ];
        if let Some(quantization) = &config.quantization {
            args.push("--quantization".into());
            args.push(quantization.clone());
        }
        if config.dtype != "auto" {
            args.push("--dtype".into());
            args.push(config.dtype.clone());
        }
        Self {
            program: python.to_string(),
            args,
        }
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}
