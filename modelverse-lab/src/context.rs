//! CLI execution context

use anyhow::{Context as _, Result};
use modelverse_core::GenerationBackend;
use modelverse_workflow::{
    InMemoryTaskStore, JsonDatasetProvider, OpenAiCompatibleBackend, Orchestrator,
    OrchestratorDeps, StaticModelResolver, TracingEventSink,
};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::output::OutputWriter;

pub struct Context {
    pub config: AppConfig,
    pub output: OutputWriter,
}

impl Context {
    pub fn new(config: AppConfig, output: OutputWriter) -> Self {
        Self { config, output }
    }

    /// Generation client for `api_base`, defaulting to the configured endpoint.
    pub fn backend(&self, api_base: Option<&str>, timeout_secs: u64) -> Result<Arc<dyn GenerationBackend>> {
        let base = api_base.unwrap_or(&self.config.evaluation.api_base);
        let backend = OpenAiCompatibleBackend::new(base, Duration::from_secs(timeout_secs))
            .with_context(|| format!("cannot build generation client for {base}"))?;
        Ok(Arc::new(backend))
    }

    /// Wire the orchestrator against in-process storage and the local
    /// model and dataset tables.
    pub fn orchestrator(&self, backend: Arc<dyn GenerationBackend>) -> Result<Orchestrator> {
        let resolver = StaticModelResolver::new(self.config.model_paths()).allow_paths(true);
        let datasets = JsonDatasetProvider::new(self.config.dataset_dirs()?);

        let deps = OrchestratorDeps {
            store: Arc::new(InMemoryTaskStore::new()),
            resolver: Arc::new(resolver),
            datasets: Arc::new(datasets),
            backend,
            sink: Arc::new(TracingEventSink),
        };
        Ok(Orchestrator::new(
            deps,
            self.config.supervisor.clone(),
            self.config.evaluation.settings(),
        ))
    }
}
