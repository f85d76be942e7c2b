use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::fs as async_fs;

use crate::media::{ReleaseReport, ResourceKind, ResourceLedger};
use crate::narration::NarrationAudio;

use super::error::{MovieError, MovieResult};
use super::segment::{AudioTrack, SegmentKind};

/// Scratch directory and resource ledger for a single movie run.
#[derive(Debug)]
pub struct RunWorkspace {
    // Declared before `dir` so the ledger's drop backstop runs first.
    ledger: ResourceLedger,
    dir: TempDir,
}

impl RunWorkspace {
    pub fn create_in(parent: &Path) -> MovieResult<Self> {
        std::fs::create_dir_all(parent).map_err(|source| MovieError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
        let dir = tempfile::Builder::new()
            .prefix("rcv-movie-")
            .tempdir_in(parent)
            .map_err(|source| MovieError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        Ok(Self {
            ledger: ResourceLedger::new(),
            dir,
        })
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub async fn store_frame(&mut self, round_index: usize, png: &[u8]) -> MovieResult<PathBuf> {
        let path = self.dir.path().join(format!("frame-{round_index:03}.png"));
        self.write(ResourceKind::Frame, path, png).await
    }

    pub async fn store_audio(
        &mut self,
        kind: SegmentKind,
        audio: NarrationAudio,
    ) -> MovieResult<AudioTrack> {
        let extension = if audio.format.is_empty() {
            "audio"
        } else {
            audio.format.as_str()
        };
        let path = self.dir.path().join(format!("narration-{kind}.{extension}"));
        let path = self.write(ResourceKind::Audio, path, &audio.bytes).await?;
        Ok(AudioTrack {
            path,
            duration_seconds: audio.duration_seconds,
        })
    }

    pub async fn store_overlay_text(
        &mut self,
        segment_index: usize,
        overlay_index: usize,
        text: &str,
    ) -> MovieResult<PathBuf> {
        let path = self
            .dir
            .path()
            .join(format!("overlay-{segment_index:03}-{overlay_index}.txt"));
        self.write(ResourceKind::OverlayText, path, text.as_bytes())
            .await
    }

    /// Reserves the path a segment clip will be encoded to.
    pub fn register_clip(&mut self, segment_index: usize) -> PathBuf {
        let path = self
            .dir
            .path()
            .join(format!("segment-{segment_index:03}.mp4"));
        self.ledger.register(ResourceKind::SegmentClip, path)
    }

    pub async fn release(&mut self) -> ReleaseReport {
        self.ledger.release().await
    }

    async fn write(
        &mut self,
        kind: ResourceKind,
        path: PathBuf,
        contents: &[u8],
    ) -> MovieResult<PathBuf> {
        let path = self.ledger.register(kind, path);
        async_fs::write(&path, contents)
            .await
            .map_err(|source| MovieError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}
