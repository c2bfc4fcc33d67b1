use thiserror::Error;

/// Failures surfaced by the engine's I/O edges and long-running jobs.
///
/// Short histories and numeric corner cases are not errors; they resolve to
/// HOLD / UNKNOWN / zeroed results inside the pure functions.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("advisor error: {0}")]
    Advisor(String),

    #[error("optimization aborted: {0}")]
    Evaluation(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Advisor(e.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(e: tokio::task::JoinError) -> Self {
        EngineError::Evaluation(e.to_string())
    }
}
