use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Process startup failed: {0}")]
    ProcessStartup(String),

    #[error("Health check timed out: {0}")]
    HealthCheckTimeout(String),

    #[error("Sample error: {0}")]
    TransientSample(String),

    #[error("Subject failed: {0}")]
    SubjectFailure(String),

    #[error("Artifact parse error: {0}")]
    ArtifactParse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Errors that end a task in `Failed`. Everything else is absorbed
    /// into counters and logs by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::Configuration(_)
                | CoreError::ResourceUnavailable(_)
                | CoreError::ProcessStartup(_)
                | CoreError::HealthCheckTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        CoreError::Configuration(err.to_string())
    }
}
