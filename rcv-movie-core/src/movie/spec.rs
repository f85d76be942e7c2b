use serde::Serialize;

/// Frames per second of every rendered movie.
pub const FRAME_RATE: u32 = 12;

/// Parameters of one movie at one resolution; fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovieSpec {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub round_count: usize,
    pub title_text: String,
    pub closing_written: String,
    pub closing_spoken: String,
}

impl MovieSpec {
    pub fn new(
        width: u32,
        height: u32,
        round_count: usize,
        title_text: impl Into<String>,
        closing_written: impl Into<String>,
        closing_spoken: impl Into<String>,
    ) -> Self {
        Self {
            width,
            height,
            frame_rate: FRAME_RATE,
            round_count,
            title_text: title_text.into(),
            closing_written: closing_written.into(),
            closing_spoken: closing_spoken.into(),
        }
    }

    /// Title card, one segment per round, closing card.
    pub fn segment_count(&self) -> usize {
        self.round_count + 2
    }
}
