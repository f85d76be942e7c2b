use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::caption::CaptionMode;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MovieConfig {
    pub renderer: RendererSection,
    pub narration: NarrationSection,
    pub movie: MovieSection,
    pub ffmpeg: FfmpegSection,
}

impl MovieConfig {
    /// Rejects values that would only surface as failures halfway through a run.
    pub fn validate(&self) -> Result<()> {
        if self.renderer.transition_script.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "renderer.transition_script",
                reason: "must not be empty".into(),
            });
        }
        if !self.renderer.movie_view_path.contains("{slug}") {
            return Err(ConfigError::Invalid {
                field: "renderer.movie_view_path",
                reason: "must contain the {slug} placeholder".into(),
            });
        }
        if self.movie.heading_font_size == 0 || self.movie.body_font_size == 0 {
            return Err(ConfigError::Invalid {
                field: "movie.*_font_size",
                reason: "font sizes must be positive".into(),
            });
        }
        if self.narration.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "narration.poll_interval_ms",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RendererSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub request_timeout_seconds: Option<u64>,
    pub base_url: String,
    pub movie_view_path: String,
    pub transition_script: String,
    pub settle_ms: u64,
    pub initial_viewport: [u32; 2],
}

impl RendererSection {
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn movie_view_url(&self, slug: &str) -> String {
        let path = self.movie_view_path.replace("{slug}", slug);
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// `round_index` is zero-based; the page script counts rounds from one.
    pub fn transition_script_for(&self, round_index: usize) -> String {
        self.transition_script
            .replace("{round}", &(round_index + 1).to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NarrationSection {
    pub endpoint: String,
    pub audio_format: String,
    pub poll_interval_ms: u64,
    pub timeout_seconds: u64,
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieSection {
    pub font: String,
    pub heading_font_size: u32,
    pub body_font_size: u32,
    pub text_color: String,
    pub background_image: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub caption_mode: CaptionMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FfmpegSection {
    pub ffmpeg: PathBuf,
    pub log_level: String,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub pix_fmt: String,
    pub audio_codec: String,
    pub audio_sample_rate: u32,
}

pub fn load_movie_config<P: AsRef<Path>>(path: P) -> Result<MovieConfig> {
    let config: MovieConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
