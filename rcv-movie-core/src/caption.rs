use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TITLE_HEADING: &str = "Ranked Choice Voting Election Results";

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse dataset {path}: {source}")]
    Parse {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("round {round} out of range (dataset has {available} rounds)")]
    RoundOutOfRange { round: usize, available: usize },
    #[error("round {round} has no {mode:?} description")]
    MissingDescription { round: usize, mode: CaptionMode },
}

/// Presentation of round captions, fixed for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionMode {
    #[default]
    Paragraph,
    EventList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionEvent {
    pub summary: String,
    pub verb: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RoundCaption {
    Paragraph(String),
    EventList(Vec<CaptionEvent>),
}

impl RoundCaption {
    /// Text used both for the body overlay and for narration.
    pub fn paragraph(&self) -> String {
        match self {
            RoundCaption::Paragraph(text) => text.clone(),
            RoundCaption::EventList(events) => events
                .iter()
                .map(|event| event.description.trim())
                .filter(|description| !description.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn mode(&self) -> CaptionMode {
        match self {
            RoundCaption::Paragraph(_) => CaptionMode::Paragraph,
            RoundCaption::EventList(_) => CaptionMode::EventList,
        }
    }
}

/// The narration-text generator for one election dataset.
pub trait CaptionSource: Send + Sync {
    /// May be zero or negative for malformed datasets; callers validate.
    fn round_count(&self) -> i64;

    fn describe_round(&self, round_index: usize) -> Result<RoundCaption, CaptionError>;

    fn describe_title(&self) -> String;

    /// Returns `(written, spoken)` closing text.
    fn describe_closing(&self, slug: &str) -> (String, String) {
        default_closing(slug)
    }
}

pub fn default_closing(slug: &str) -> (String, String) {
    (
        format!("See more details at rcvis.com/visualize={slug}"),
        "See more details at R C Vis dot com".to_string(),
    )
}

#[derive(Debug, Clone, Deserialize)]
struct DatasetFile {
    slug: String,
    title: String,
    rounds: Vec<RoundEntry>,
    #[serde(default)]
    closing: Option<ClosingEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RoundEntry {
    #[serde(default)]
    paragraph: Option<String>,
    #[serde(default)]
    events: Option<Vec<CaptionEvent>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClosingEntry {
    written: String,
    spoken: String,
}

/// Captions pre-computed by the results summarizer and stored as JSON.
#[derive(Debug, Clone)]
pub struct DatasetCaptions {
    slug: String,
    title: String,
    rounds: Vec<RoundEntry>,
    closing: Option<ClosingEntry>,
    mode: CaptionMode,
}

impl DatasetCaptions {
    pub fn load<P: AsRef<Path>>(path: P, mode: CaptionMode) -> Result<Self, CaptionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CaptionError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        Self::from_json(&content, mode).map_err(|source| CaptionError::Parse {
            source,
            path: path.to_path_buf(),
        })
    }

    pub fn from_json(content: &str, mode: CaptionMode) -> Result<Self, serde_json::Error> {
        let file: DatasetFile = serde_json::from_str(content)?;
        Ok(Self {
            slug: file.slug,
            title: file.title,
            rounds: file.rounds,
            closing: file.closing,
            mode,
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn mode(&self) -> CaptionMode {
        self.mode
    }
}

impl CaptionSource for DatasetCaptions {
    fn round_count(&self) -> i64 {
        self.rounds.len() as i64
    }

    fn describe_round(&self, round_index: usize) -> Result<RoundCaption, CaptionError> {
        let entry = self
            .rounds
            .get(round_index)
            .ok_or(CaptionError::RoundOutOfRange {
                round: round_index,
                available: self.rounds.len(),
            })?;
        let missing = || CaptionError::MissingDescription {
            round: round_index,
            mode: self.mode,
        };
        match self.mode {
            CaptionMode::Paragraph => entry
                .paragraph
                .clone()
                .map(RoundCaption::Paragraph)
                .ok_or_else(missing),
            CaptionMode::EventList => entry
                .events
                .clone()
                .map(RoundCaption::EventList)
                .ok_or_else(missing),
        }
    }

    fn describe_title(&self) -> String {
        self.title.clone()
    }

    fn describe_closing(&self, slug: &str) -> (String, String) {
        match &self.closing {
            Some(closing) => (closing.written.clone(), closing.spoken.clone()),
            None => default_closing(slug),
        }
    }
}
