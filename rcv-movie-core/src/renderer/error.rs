use thiserror::Error;

pub type RendererResult<T> = Result<T, RendererError>;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("page script failed: {0}")]
    Script(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<tokio::task::JoinError> for RendererError {
    fn from(err: tokio::task::JoinError) -> Self {
        RendererError::Unexpected(err.to_string())
    }
}
