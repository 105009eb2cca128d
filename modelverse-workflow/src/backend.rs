use async_trait::async_trait;
use modelverse_core::{
    CoreError, GenerationBackend, GenerationRequest, GenerationResponse, TokenUsage,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Response had no choices")]
    EmptyResponse,

    #[error("Malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<BackendError> for CoreError {
    fn from(err: BackendError) -> Self {
        CoreError::Generation(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleBackend {
    client: Client,
    base_url: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Backend for a local server on `port`.
    pub fn local(port: u16, timeout: Duration) -> Result<Self, BackendError> {
        Self::new(api_base(port), timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn chat(&self, request: &GenerationRequest) -> Result<GenerationResponse, BackendError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(%url, model = %request.model, "sending chat completion");

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status { status, body });
        }

        let completion: ChatCompletion = serde_json::from_str(&body)?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .ok_or(BackendError::EmptyResponse)?
            .message
            .content
            .unwrap_or_default();

        Ok(GenerationResponse {
            content: content.trim().to_string(),
            usage: completion.usage,
        })
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatibleBackend {
    async fn generate(&self, request: GenerationRequest) -> modelverse_core::Result<GenerationResponse> {
        Ok(self.chat(&request).await?)
    }
}

/// Base URL of a locally served model.
pub fn api_base(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}
