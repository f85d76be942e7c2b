pub mod caption;
pub mod config;
pub mod error;
pub mod media;
pub mod movie;
pub mod narration;
pub mod renderer;

pub use caption::{
    default_closing, CaptionError, CaptionEvent, CaptionMode, CaptionSource, DatasetCaptions,
    RoundCaption, TITLE_HEADING,
};
pub use config::{
    load_movie_config, FfmpegSection, MovieConfig, MovieSection, NarrationSection,
    RendererSection,
};
pub use error::{ConfigError, Result};
pub use media::{
    CommandExecutor, MediaEncoder, MediaError, MediaResult, ReleaseReport, ResourceKind,
    ResourceLedger, SystemCommandExecutor, TextStyle,
};
pub use movie::{
    AssemblyContext, AssemblyState, DatasetRef, MovieArtifact, MovieAssembler, MovieError,
    MovieResult, MovieSpec, RenderSession, RenderSessionFactory, RenderedMovie, Segment,
    SegmentKind, SegmentSummary, FRAME_RATE,
};
pub use narration::{
    HttpNarrationBackend, HttpNarrationFactory, NarrationAudio, NarrationBackend,
    NarrationBackendFactory, NarrationError, NarrationHandle, NarrationJob, NarrationRequester,
    NarrationResult,
};
pub use renderer::{
    ChromiumLauncher, ChromiumSession, RendererError, RendererLauncher, RendererResult,
    RendererSession,
};
