use std::path::PathBuf;

use thiserror::Error;

use crate::caption::CaptionError;
use crate::media::MediaError;
use crate::narration::NarrationError;
use crate::renderer::RendererError;

use super::assembler::AssemblyState;

pub type MovieResult<T> = Result<T, MovieError>;

#[derive(Debug, Error)]
pub enum MovieError {
    /// The page could not advance to the 0-based `round`. The message names
    /// it 1-based, as the page and the movie headings do.
    #[error(
        "renderer failed to transition to round {}: {message}. This error commonly occurs with Xvfb issues.\n\nCurrent page state:\n{page_state}",
        .round + 1
    )]
    RenderTransitionFailure {
        round: usize,
        message: String,
        page_state: String,
    },
    #[error(transparent)]
    Narration(#[from] NarrationError),
    #[error("dataset reports {0} rounds; at least one is required")]
    InvalidRoundCount(i64),
    #[error("renderer error: {0}")]
    Renderer(#[from] RendererError),
    #[error("caption error: {0}")]
    Caption(#[from] CaptionError),
    #[error("media error: {0}")]
    Media(#[from] MediaError),
    #[error("captured frame for round {round} is not a readable image: {reason}")]
    InvalidFrame { round: usize, reason: String },
    #[error("assembler already ran and is {0}")]
    AlreadyRan(AssemblyState),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}
