use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("{service}: timed out after {attempts} attempt(s)")]
    SignalFetchTimeout { service: String, attempts: u32 },

    #[error("{service}: {message}")]
    SignalFetchError { service: String, message: String },

    #[error("{service}: malformed response: {message}")]
    MalformedResponse { service: String, message: String },

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TriageError>;
