//! Movie assembly: segments, frame capture, the per-resolution assembler and
//! the dataset-scoped session that drives it.

mod assembler;
mod builder;
mod capture;
mod error;
mod segment;
mod session;
mod spec;
mod workspace;

pub use assembler::{AssemblyContext, AssemblyState, MovieAssembler, RenderedMovie};
pub use builder::{round_heading, SegmentBuilder};
pub use capture::{CapturedFrame, FrameCapturer};
pub use error::{MovieError, MovieResult};
pub use segment::{
    AudioTrack, OverlayRole, Placement, Segment, SegmentKind, SegmentSummary, TextOverlay, Visual,
};
pub use session::{DatasetRef, MovieArtifact, RenderSession, RenderSessionFactory};
pub use spec::{MovieSpec, FRAME_RATE};
pub use workspace::RunWorkspace;
