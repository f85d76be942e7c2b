use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::caption::{CaptionSource, TITLE_HEADING};
use crate::media::{wrap_text, MediaEncoder};
use crate::narration::NarrationRequester;
use crate::renderer::RendererSession;

use super::builder::SegmentBuilder;
use super::capture::FrameCapturer;
use super::error::{MovieError, MovieResult};
use super::segment::{Segment, SegmentKind, SegmentSummary};
use super::spec::MovieSpec;
use super::workspace::RunWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssemblyState {
    Idle,
    TitleBuilt,
    RoundsInProgress { round: usize },
    ClosingBuilt,
    Rendering,
    Done,
    Failed,
}

impl fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyState::Idle => write!(f, "idle"),
            AssemblyState::TitleBuilt => write!(f, "title_built"),
            AssemblyState::RoundsInProgress { round } => write!(f, "rounds_in_progress({round})"),
            AssemblyState::ClosingBuilt => write!(f, "closing_built"),
            AssemblyState::Rendering => write!(f, "rendering"),
            AssemblyState::Done => write!(f, "done"),
            AssemblyState::Failed => write!(f, "failed"),
        }
    }
}

/// Everything one run borrows from its session.
pub struct AssemblyContext<'a> {
    pub slug: &'a str,
    pub renderer: &'a mut dyn RendererSession,
    pub narration: &'a NarrationRequester,
    pub captions: &'a dyn CaptionSource,
    pub encoder: &'a MediaEncoder,
    pub background: &'a Path,
    pub work_dir: &'a Path,
    pub settle: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedMovie {
    pub output: PathBuf,
    pub spec: MovieSpec,
    pub segments: Vec<SegmentSummary>,
    pub duration_seconds: f64,
    pub released_resources: usize,
}

/// Runs one movie at one resolution: title, every round in order, closing,
/// then the composite render.
///
/// Intermediate files live in a [`RunWorkspace`] whose ledger is released
/// before `render` returns, whether the run succeeded or not.
pub struct MovieAssembler<'a> {
    ctx: AssemblyContext<'a>,
    width: u32,
    height: u32,
    state: AssemblyState,
    history: Vec<AssemblyState>,
}

impl<'a> MovieAssembler<'a> {
    pub fn new(ctx: AssemblyContext<'a>, width: u32, height: u32) -> Self {
        Self {
            ctx,
            width,
            height,
            state: AssemblyState::Idle,
            history: vec![AssemblyState::Idle],
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[AssemblyState] {
        &self.history
    }

    pub async fn render(&mut self, output: &Path) -> MovieResult<RenderedMovie> {
        if self.state != AssemblyState::Idle {
            return Err(MovieError::AlreadyRan(self.state));
        }

        let mut workspace = match RunWorkspace::create_in(self.ctx.work_dir) {
            Ok(workspace) => workspace,
            Err(err) => {
                self.enter(AssemblyState::Failed);
                return Err(err);
            }
        };
        let result = self.run(&mut workspace, output).await;
        let report = workspace.release().await;

        match result {
            Ok(mut movie) => {
                movie.released_resources = report.released.len();
                self.enter(AssemblyState::Done);
                info!(
                    slug = self.ctx.slug,
                    output = %movie.output.display(),
                    segments = movie.segments.len(),
                    duration = movie.duration_seconds,
                    released = report.released.len(),
                    "movie assembled"
                );
                Ok(movie)
            }
            Err(err) => {
                self.enter(AssemblyState::Failed);
                error!(
                    slug = self.ctx.slug,
                    width = self.width,
                    height = self.height,
                    released = report.released.len(),
                    error = %err,
                    "movie assembly failed"
                );
                Err(err)
            }
        }
    }

    fn plan(&self) -> MovieResult<MovieSpec> {
        let reported = self.ctx.captions.round_count();
        let round_count = usize::try_from(reported)
            .ok()
            .filter(|count| *count > 0)
            .ok_or(MovieError::InvalidRoundCount(reported))?;
        let title = format!("{TITLE_HEADING}\n\n\n{}", self.ctx.captions.describe_title());
        let (closing_written, closing_spoken) = self.ctx.captions.describe_closing(self.ctx.slug);
        Ok(MovieSpec::new(
            self.width,
            self.height,
            round_count,
            title,
            closing_written,
            closing_spoken,
        ))
    }

    async fn run(
        &mut self,
        workspace: &mut RunWorkspace,
        output: &Path,
    ) -> MovieResult<RenderedMovie> {
        let spec = self.plan()?;
        let narration = self.ctx.narration;
        let background = self.ctx.background;
        let mut segments = Vec::with_capacity(spec.segment_count());

        let title = SegmentBuilder::new(narration, &spec, workspace)
            .build_text_card(SegmentKind::Title, &spec.title_text, &spec.title_text, background)
            .await?;
        segments.push(title);
        self.enter(AssemblyState::TitleBuilt);

        for round in 0..spec.round_count {
            self.enter(AssemblyState::RoundsInProgress { round });
            let caption = self.ctx.captions.describe_round(round)?;
            let text = caption.paragraph();
            // Synthesis runs while the renderer transitions and captures.
            let pending = narration.submit(&text).await?;
            let frame = FrameCapturer::new(&mut *self.ctx.renderer, self.ctx.settle)
                .capture(round)
                .await?;
            let segment = SegmentBuilder::new(narration, &spec, workspace)
                .build_round_segment(round, &caption, frame, pending)
                .await?;
            segments.push(segment);
        }

        let closing = SegmentBuilder::new(narration, &spec, workspace)
            .build_text_card(
                SegmentKind::Closing,
                &spec.closing_written,
                &spec.closing_spoken,
                background,
            )
            .await?;
        segments.push(closing);
        self.enter(AssemblyState::ClosingBuilt);

        self.enter(AssemblyState::Rendering);
        self.composite(&spec, &segments, workspace, output).await?;

        let summaries: Vec<SegmentSummary> = segments.iter().map(Segment::summary).collect();
        let duration_seconds = segments.iter().map(Segment::duration).sum();
        Ok(RenderedMovie {
            output: output.to_path_buf(),
            spec,
            segments: summaries,
            duration_seconds,
            released_resources: 0,
        })
    }

    async fn composite(
        &self,
        spec: &MovieSpec,
        segments: &[Segment],
        workspace: &mut RunWorkspace,
        output: &Path,
    ) -> MovieResult<()> {
        let encoder = self.ctx.encoder;
        let mut clips = Vec::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            let mut overlay_files = Vec::with_capacity(segment.overlays().len());
            for (overlay_index, overlay) in segment.overlays().iter().enumerate() {
                let wrapped = wrap_text(
                    &overlay.text,
                    spec.width,
                    encoder.style().size_for(overlay.role),
                );
                overlay_files.push(
                    workspace
                        .store_overlay_text(index, overlay_index, &wrapped)
                        .await?,
                );
            }
            let clip = workspace.register_clip(index);
            encoder
                .encode_segment(segment, &overlay_files, spec, &clip)
                .await?;
            clips.push(clip);
        }
        debug!(clips = clips.len(), "segments encoded");
        encoder.concatenate(&clips, spec, output).await?;
        Ok(())
    }

    fn enter(&mut self, state: AssemblyState) {
        debug!(slug = self.ctx.slug, from = %self.state, to = %state, "assembly state");
        self.state = state;
        self.history.push(state);
    }
}
