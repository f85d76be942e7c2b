use std::path::Path;

use tracing::debug;

use crate::caption::RoundCaption;
use crate::narration::{NarrationHandle, NarrationRequester};

use super::capture::CapturedFrame;
use super::error::{MovieError, MovieResult};
use super::segment::{Placement, Segment, SegmentKind, TextOverlay, Visual};
use super::spec::MovieSpec;
use super::workspace::RunWorkspace;

/// Turns narration and visuals into [`Segment`]s whose length is the audio's.
pub struct SegmentBuilder<'a> {
    narration: &'a NarrationRequester,
    spec: &'a MovieSpec,
    workspace: &'a mut RunWorkspace,
}

impl<'a> SegmentBuilder<'a> {
    pub fn new(
        narration: &'a NarrationRequester,
        spec: &'a MovieSpec,
        workspace: &'a mut RunWorkspace,
    ) -> Self {
        Self {
            narration,
            spec,
            workspace,
        }
    }

    /// Title or closing card: `written` centred over `background`, `spoken` narrated.
    pub async fn build_text_card(
        &mut self,
        kind: SegmentKind,
        written: &str,
        spoken: &str,
        background: &Path,
    ) -> MovieResult<Segment> {
        let audio = self.narration.submit(spoken).await?.await_audio().await?;
        let audio = self.workspace.store_audio(kind, audio).await?;
        debug!(%kind, duration = audio.duration_seconds, "text card built");
        Ok(Segment::new(
            kind,
            Visual::StaticImage(background.to_path_buf()),
            vec![TextOverlay::heading(written, Placement::Center)],
            audio,
        ))
    }

    /// Round segment over an already captured frame. `narration` must have
    /// been submitted before the frame was captured.
    pub async fn build_round_segment(
        &mut self,
        round_index: usize,
        caption: &RoundCaption,
        frame: CapturedFrame,
        narration: NarrationHandle,
    ) -> MovieResult<Segment> {
        if frame.round_index != round_index {
            return Err(MovieError::InvalidFrame {
                round: round_index,
                reason: format!("frame was captured for round {}", frame.round_index),
            });
        }
        let kind = SegmentKind::Round(round_index);
        let audio = narration.await_audio().await?;
        let frame_path = self.workspace.store_frame(round_index, &frame.png).await?;
        let audio = self.workspace.store_audio(kind, audio).await?;
        debug!(
            round = round_index,
            duration = audio.duration_seconds,
            captured = %format!("{}x{}", frame.width, frame.height),
            target = %format!("{}x{}", self.spec.width, self.spec.height),
            "round segment built"
        );
        Ok(Segment::new(
            kind,
            Visual::CapturedFrame(frame_path),
            vec![
                TextOverlay::heading(round_heading(round_index), Placement::North),
                TextOverlay::body(caption.paragraph(), Placement::South),
            ],
            audio,
        ))
    }
}

pub fn round_heading(round_index: usize) -> String {
    format!("Round {}", round_index + 1)
}
