use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "round", rename_all = "snake_case")]
pub enum SegmentKind {
    Title,
    Round(usize),
    Closing,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentKind::Title => write!(f, "title"),
            SegmentKind::Round(index) => write!(f, "round-{index}"),
            SegmentKind::Closing => write!(f, "closing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visual {
    StaticImage(PathBuf),
    CapturedFrame(PathBuf),
}

impl Visual {
    pub fn path(&self) -> &Path {
        match self {
            Visual::StaticImage(path) | Visual::CapturedFrame(path) => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayRole {
    Heading,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    North,
    South,
    Center,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextOverlay {
    pub text: String,
    pub role: OverlayRole,
    pub placement: Placement,
}

impl TextOverlay {
    pub fn heading(text: impl Into<String>, placement: Placement) -> Self {
        Self {
            text: text.into(),
            role: OverlayRole::Heading,
            placement,
        }
    }

    pub fn body(text: impl Into<String>, placement: Placement) -> Self {
        Self {
            text: text.into(),
            role: OverlayRole::Body,
            placement,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

/// One timed unit of the movie.
///
/// There is no way to set a duration: it is always the narration length,
/// and the visual layers are held for that long.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    kind: SegmentKind,
    visual: Visual,
    overlays: Vec<TextOverlay>,
    audio: AudioTrack,
}

impl Segment {
    pub fn new(
        kind: SegmentKind,
        visual: Visual,
        overlays: Vec<TextOverlay>,
        audio: AudioTrack,
    ) -> Self {
        Self {
            kind,
            visual,
            overlays,
            audio,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn visual(&self) -> &Visual {
        &self.visual
    }

    pub fn overlays(&self) -> &[TextOverlay] {
        &self.overlays
    }

    pub fn audio(&self) -> &AudioTrack {
        &self.audio
    }

    pub fn duration(&self) -> f64 {
        self.audio.duration_seconds
    }

    pub fn summary(&self) -> SegmentSummary {
        SegmentSummary {
            kind: self.kind,
            overlays: self.overlays.clone(),
            duration_seconds: self.duration(),
        }
    }
}

/// Resolution-independent description of a built segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub kind: SegmentKind,
    pub overlays: Vec<TextOverlay>,
    pub duration_seconds: f64,
}

impl SegmentSummary {
    pub fn heading(&self) -> Option<&str> {
        self.text_for(OverlayRole::Heading)
    }

    pub fn body(&self) -> Option<&str> {
        self.text_for(OverlayRole::Body)
    }

    fn text_for(&self, role: OverlayRole) -> Option<&str> {
        self.overlays
            .iter()
            .find(|overlay| overlay.role == role)
            .map(|overlay| overlay.text.as_str())
    }
}
