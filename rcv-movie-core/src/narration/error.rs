use thiserror::Error;

pub type NarrationResult<T> = Result<T, NarrationError>;

#[derive(Debug, Error)]
pub enum NarrationError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid narration endpoint: {0}")]
    Url(#[from] url::ParseError),
    #[error("narration job {job_id} failed: {message}")]
    Job { job_id: String, message: String },
    #[error("narration job {job_id} did not complete within {seconds}s")]
    Timeout { job_id: String, seconds: u64 },
    #[error("narration backend protocol error: {0}")]
    Protocol(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<tokio::task::JoinError> for NarrationError {
    fn from(err: tokio::task::JoinError) -> Self {
        NarrationError::Unexpected(err.to_string())
    }
}
