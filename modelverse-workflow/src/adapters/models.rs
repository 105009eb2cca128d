use async_trait::async_trait;
use modelverse_core::{CoreError, ModelResolver, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Resolves model ids from a fixed table, falling back to treating the id
/// itself as a filesystem path when `allow_paths` is set.
#[derive(Debug, Clone, Default)]
pub struct StaticModelResolver {
    models: HashMap<String, PathBuf>,
    allow_paths: bool,
}

impl StaticModelResolver {
    pub fn new(models: HashMap<String, PathBuf>) -> Self {
        Self {
            models,
            allow_paths: false,
        }
    }

    pub fn with_model(mut self, id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.models.insert(id.into(), path.into());
        self
    }

    pub fn allow_paths(mut self, allow: bool) -> Self {
        self.allow_paths = allow;
        self
    }
}

#[async_trait]
impl ModelResolver for StaticModelResolver {
    async fn resolve(&self, resource_id: &str) -> Result<Option<PathBuf>> {
        if let Some(path) = self.models.get(resource_id) {
            return Ok(Some(path.clone()));
        }
        if self.allow_paths {
            let path = PathBuf::from(resource_id);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

/// Resolve `model_id` to a path that exists on disk.
pub async fn resolve_existing(resolver: &dyn ModelResolver, model_id: &str) -> Result<PathBuf> {
    let path = resolver
        .resolve(model_id)
        .await?
        .ok_or_else(|| CoreError::Configuration(format!("model {model_id} is not available locally")))?;
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(CoreError::Configuration(format!(
            "model path {} does not exist",
            path.display()
        )));
    }
    Ok(path)
}
