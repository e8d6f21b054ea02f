use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors the orchestrator can produce. Four broad kinds: a caller handed
/// the engine something invalid, the LLM produced output that failed
/// validation, the LLM transport itself failed, or persistence failed.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum AppError {
    #[error("caller misuse: {0}")]
    CallerMisuse(String),

    /// Never surfaced to a caller directly — consumed internally by the
    /// turn adapter's retry loop and only turns into a fallback turn.
    #[error("llm quality failure: {0}")]
    LlmQuality(String),

    #[error("llm transport failure: {0}")]
    LlmTransport(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::LlmTransport(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
