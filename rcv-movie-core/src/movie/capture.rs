use std::io::Cursor;
use std::time::Duration;

use tracing::{debug, warn};

use crate::renderer::RendererSession;

use super::error::{MovieError, MovieResult};

/// One viewport capture taken after a round transition.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub round_index: usize,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("round_index", &self.round_index)
            .field("png", &self.png.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Drives the renderer to a round and grabs the resulting viewport.
pub struct FrameCapturer<'a> {
    renderer: &'a mut dyn RendererSession,
    settle: Duration,
}

impl<'a> FrameCapturer<'a> {
    pub fn new(renderer: &'a mut dyn RendererSession, settle: Duration) -> Self {
        Self { renderer, settle }
    }

    pub async fn capture(&mut self, round_index: usize) -> MovieResult<CapturedFrame> {
        if let Err(err) = self.renderer.execute_round_transition(round_index).await {
            warn!(round = round_index, error = %err, "round transition failed");
            let page_state = match self.renderer.dump_page_state().await {
                Ok(state) => state,
                Err(dump_err) => format!("<page state unavailable: {dump_err}>"),
            };
            return Err(MovieError::RenderTransitionFailure {
                round: round_index,
                message: err.to_string(),
                page_state,
            });
        }

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let png = self.renderer.capture_viewport().await?;
        let (width, height) = frame_dimensions(&png).map_err(|reason| MovieError::InvalidFrame {
            round: round_index,
            reason,
        })?;
        debug!(round = round_index, width, height, bytes = png.len(), "frame captured");
        Ok(CapturedFrame {
            round_index,
            png,
            width,
            height,
        })
    }
}

fn frame_dimensions(bytes: &[u8]) -> Result<(u32, u32), String> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| err.to_string())?
        .into_dimensions()
        .map_err(|err| err.to_string())
}
