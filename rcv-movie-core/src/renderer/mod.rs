mod chromium;
mod error;

use async_trait::async_trait;

pub use chromium::{ChromiumLauncher, ChromiumSession};
pub use error::{RendererError, RendererResult};

/// A scriptable page-rendering context showing one dataset's movie view.
///
/// Viewport size and transition state are session-global, so a session must
/// only ever be driven by one movie run at a time.
#[async_trait]
pub trait RendererSession: Send {
    async fn navigate(&mut self, url: &str) -> RendererResult<()>;

    async fn set_viewport(&mut self, width: u32, height: u32) -> RendererResult<()>;

    /// Advances the page to `round_index` (zero-based). Script faults surface
    /// as [`RendererError::Script`].
    async fn execute_round_transition(&mut self, round_index: usize) -> RendererResult<()>;

    /// PNG bytes of the current viewport.
    async fn capture_viewport(&mut self) -> RendererResult<Vec<u8>>;

    async fn dump_page_state(&mut self) -> RendererResult<String>;

    async fn shutdown(&mut self) -> RendererResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait RendererLauncher: Send + Sync {
    async fn launch(&self) -> RendererResult<Box<dyn RendererSession>>;
}
