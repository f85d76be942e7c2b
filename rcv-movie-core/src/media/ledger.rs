use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs as async_fs;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Frame,
    Audio,
    OverlayText,
    SegmentClip,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Frame => "frame",
            ResourceKind::Audio => "audio",
            ResourceKind::OverlayText => "overlay_text",
            ResourceKind::SegmentClip => "segment_clip",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaResource {
    pub kind: ResourceKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Released paths, in registration order.
    pub released: Vec<PathBuf>,
    pub failed: usize,
}

/// Intermediate media created during one run, released in registration order.
///
/// `release` is the normal path. Dropping a ledger that still holds entries
/// releases them synchronously and logs a warning.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    entries: Vec<MediaResource>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        debug!(%kind, path = %path.display(), "resource registered");
        self.entries.push(MediaResource {
            kind,
            path: path.clone(),
        });
        path
    }

    pub fn entries(&self) -> &[MediaResource] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }

    pub async fn release(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        for entry in self.entries.drain(..) {
            match async_fs::remove_file(&entry.path).await {
                Ok(()) => report.released.push(entry.path),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    report.released.push(entry.path)
                }
                Err(err) => {
                    warn!(kind = %entry.kind, path = %entry.path.display(), error = %err, "failed to release resource");
                    report.failed += 1;
                }
            }
        }
        debug!(
            released = report.released.len(),
            failed = report.failed,
            "resource ledger cleared"
        );
        report
    }
}

impl Drop for ResourceLedger {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        warn!(
            pending = self.entries.len(),
            "ResourceLedger dropped without explicit release"
        );
        for entry in self.entries.drain(..) {
            if let Err(err) = std::fs::remove_file(&entry.path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %entry.path.display(), error = %err, "failed to remove resource on drop");
                }
            }
        }
    }
}
