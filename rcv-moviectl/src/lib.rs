use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rcv_movie_core::{
    load_movie_config, CaptionMode, DatasetCaptions, DatasetRef, HttpNarrationBackend,
    MovieArtifact, MovieConfig, RenderSessionFactory,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] rcv_movie_core::ConfigError),
    #[error("dataset error: {0}")]
    Caption(#[from] rcv_movie_core::CaptionError),
    #[error("{0}")]
    Movie(#[from] rcv_movie_core::MovieError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Renders narrated ranked-choice election movies", long_about = None)]
pub struct Cli {
    /// Path to movie.toml
    #[arg(long, default_value = "configs/movie.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Renders one dataset at one or more resolutions
    Render(RenderArgs),
    /// Checks configured paths and services
    Check,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Dataset captions JSON
    #[arg(long)]
    pub dataset: PathBuf,
    /// Target resolution, repeatable
    #[arg(long = "resolution", default_value = "1920x1080")]
    pub resolutions: Vec<Resolution>,
    /// Caption presentation; defaults to movie.caption_mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
    /// Overrides movie.output_dir
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Paragraph,
    EventList,
}

impl From<ModeArg> for CaptionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Paragraph => CaptionMode::Paragraph,
            ModeArg::EventList => CaptionMode::EventList,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let (width, height) = value
            .split_once(|c: char| c == 'x' || c == 'X')
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("invalid dimension `{part}` in `{value}`"))
        };
        Ok(Self {
            width: parse(width)?,
            height: parse(height)?,
        })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Render(args) => {
            let config = load_movie_config(&cli.config)?;
            let report = render_dataset(config, args).await?;
            render(&report, cli.format)?;
        }
        Commands::Check => {
            let report = health_check(&cli.config);
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
    }
    Ok(())
}

async fn render_dataset(mut config: MovieConfig, args: &RenderArgs) -> Result<RenderReport> {
    if let Some(dir) = &args.output_dir {
        config.movie.output_dir = dir.clone();
    }
    let mode = args
        .mode
        .map(CaptionMode::from)
        .unwrap_or(config.movie.caption_mode);
    let captions = DatasetCaptions::load(&args.dataset, mode)?;
    let slug = captions.slug().to_string();
    let output_dir = config.movie.output_dir.clone();

    let factory = RenderSessionFactory::from_config(config);
    let session = factory
        .create(DatasetRef::new(slug.clone(), Arc::new(captions)))
        .await?;

    let mut movies = Vec::with_capacity(args.resolutions.len());
    for resolution in &args.resolutions {
        info!(%slug, %resolution, "rendering");
        match session.render(resolution.width, resolution.height).await {
            Ok(artifact) => movies.push(artifact),
            Err(err) => {
                if let Err(close) = session.close().await {
                    warn!(error = %close, "renderer shutdown failed");
                }
                return Err(err.into());
            }
        }
    }
    session.close().await?;

    let report = RenderReport { slug, movies };
    let manifest = write_manifest(&output_dir, &report)?;
    info!(manifest = %manifest.display(), "movie manifest written");
    Ok(report)
}

/// Writes `<slug>.movies.json` listing every rendered artifact.
pub fn write_manifest(output_dir: &Path, report: &RenderReport) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{}.movies.json", report.slug));
    fs::write(&path, serde_json::to_vec_pretty(&report.movies)?)?;
    Ok(path)
}

pub fn health_check(config_path: &Path) -> Vec<HealthEntry> {
    let mut results = vec![check_path("movie.toml", config_path)];
    let config = match load_movie_config(config_path) {
        Ok(config) => config,
        Err(err) => {
            results.push(HealthEntry::error("config", err.to_string()));
            return results;
        }
    };

    results.push(check_path("background", &config.movie.background_image));
    results.push(check_path(
        "chromium",
        Path::new(&config.renderer.executable_path),
    ));
    results.push(check_executable("ffmpeg", &config.ffmpeg.ffmpeg));
    results.push(check_directory("work_dir", &config.movie.work_dir));
    results.push(check_directory("output_dir", &config.movie.output_dir));
    results.push(match HttpNarrationBackend::new(config.narration.clone()) {
        Ok(_) => HealthEntry::ok("narration", config.narration.endpoint.clone()),
        Err(err) => HealthEntry::error("narration", err.to_string()),
    });
    results
}

fn check_path(name: &str, path: &Path) -> HealthEntry {
    if path.exists() {
        HealthEntry::ok(name, format!("{}", path.display()))
    } else {
        HealthEntry::error(name, format!("{path} missing", path = path.display()))
    }
}

fn check_directory(name: &str, path: &Path) -> HealthEntry {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => HealthEntry::ok(name, format!("{}", path.display())),
        Ok(_) => HealthEntry::warn(
            name,
            format!("{path} is not a directory", path = path.display()),
        ),
        Err(_) => HealthEntry::warn(
            name,
            format!("{path} not found, will be created", path = path.display()),
        ),
    }
}

/// Bare program names are looked up on `PATH`.
fn check_executable(name: &str, program: &Path) -> HealthEntry {
    if program.components().count() > 1 {
        return check_path(name, program);
    }
    let found = std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(program))
                .find(|candidate| candidate.is_file())
        })
        .unwrap_or_default();
    match found {
        Some(path) => HealthEntry::ok(name, format!("{}", path.display())),
        None => HealthEntry::error(
            name,
            format!("{program} not found on PATH", program = program.display()),
        ),
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
pub struct RenderReport {
    pub slug: String,
    pub movies: Vec<MovieArtifact>,
}

impl DisplayFallback for RenderReport {
    fn display(&self) -> String {
        let mut lines = vec![format!("{} ({} movies)", self.slug, self.movies.len())];
        for movie in &self.movies {
            lines.push(format!(
                "  {}x{} {:.2}s {} segments -> {} (sha256 {})",
                movie.width,
                movie.height,
                movie.duration_seconds,
                movie.segment_count,
                movie.path.display(),
                movie.sha256
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for entry in self {
            lines.push(entry.display());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for HealthEntry {
    fn display(&self) -> String {
        format!(
            "[{status}] {name} — {detail}",
            status = self.status,
            name = self.name,
            detail = self.detail
        )
    }
}
