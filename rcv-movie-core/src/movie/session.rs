use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hex::encode as hex_encode;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::caption::CaptionSource;
use crate::config::MovieConfig;
use crate::media::{MediaEncoder, TextStyle};
use crate::narration::{HttpNarrationFactory, NarrationBackendFactory, NarrationRequester};
use crate::renderer::{ChromiumLauncher, RendererLauncher, RendererSession};

use super::assembler::{AssemblyContext, MovieAssembler};
use super::error::{MovieError, MovieResult};
use super::segment::SegmentSummary;

/// A dataset to render: its slug and where its captions come from.
#[derive(Clone)]
pub struct DatasetRef {
    pub slug: String,
    pub captions: Arc<dyn CaptionSource>,
}

impl DatasetRef {
    pub fn new(slug: impl Into<String>, captions: Arc<dyn CaptionSource>) -> Self {
        Self {
            slug: slug.into(),
            captions,
        }
    }
}

impl fmt::Debug for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetRef")
            .field("slug", &self.slug)
            .field("rounds", &self.captions.round_count())
            .finish()
    }
}

/// A finished movie file, as handed to whatever stores it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieArtifact {
    pub slug: String,
    pub width: u32,
    pub height: u32,
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub segment_count: usize,
    pub segments: Vec<SegmentSummary>,
    pub sha256: String,
    pub rendered_at: DateTime<Utc>,
}

/// Creates one [`RenderSession`] per dataset.
pub struct RenderSessionFactory {
    config: Arc<MovieConfig>,
    launcher: Arc<dyn RendererLauncher>,
    narration: Arc<dyn NarrationBackendFactory>,
    encoder: Arc<MediaEncoder>,
}

impl RenderSessionFactory {
    pub fn new(
        config: Arc<MovieConfig>,
        launcher: Arc<dyn RendererLauncher>,
        narration: Arc<dyn NarrationBackendFactory>,
        encoder: Arc<MediaEncoder>,
    ) -> Self {
        Self {
            config,
            launcher,
            narration,
            encoder,
        }
    }

    /// Chromium renderer, HTTP narration and system ffmpeg, all from `config`.
    pub fn from_config(config: MovieConfig) -> Self {
        let launcher = Arc::new(ChromiumLauncher::new(config.renderer.clone()));
        let narration = Arc::new(HttpNarrationFactory::new(config.narration.clone()));
        let encoder = Arc::new(MediaEncoder::new(
            config.ffmpeg.clone(),
            TextStyle::from_movie_section(&config.movie),
            None,
        ));
        Self::new(Arc::new(config), launcher, narration, encoder)
    }

    /// Launches the renderer, opens the dataset's movie view once and builds
    /// the narration backend the session will reuse for every resolution.
    pub async fn create(&self, dataset: DatasetRef) -> MovieResult<RenderSession> {
        let url = self.config.renderer.movie_view_url(&dataset.slug);
        let mut renderer = self.launcher.launch().await?;
        if let Err(err) = renderer.navigate(&url).await {
            if let Err(shutdown) = renderer.shutdown().await {
                warn!(error = %shutdown, "renderer shutdown after failed navigation");
            }
            return Err(err.into());
        }
        let backend = match self.narration.build() {
            Ok(backend) => backend,
            Err(err) => {
                if let Err(shutdown) = renderer.shutdown().await {
                    warn!(error = %shutdown, "renderer shutdown after narration setup failure");
                }
                return Err(err.into());
            }
        };
        info!(slug = %dataset.slug, %url, "render session ready");
        Ok(RenderSession {
            dataset,
            config: Arc::clone(&self.config),
            renderer: Mutex::new(renderer),
            narration: NarrationRequester::new(backend),
            encoder: Arc::clone(&self.encoder),
        })
    }
}

/// Dataset-scoped renderer page and narration backend.
///
/// The page's viewport and transition state are global to the session, so
/// renders through one session are serialized: concurrent `render` calls wait
/// for each other rather than interleave.
pub struct RenderSession {
    dataset: DatasetRef,
    config: Arc<MovieConfig>,
    renderer: Mutex<Box<dyn RendererSession>>,
    narration: NarrationRequester,
    encoder: Arc<MediaEncoder>,
}

impl fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSession")
            .field("dataset", &self.dataset)
            .finish_non_exhaustive()
    }
}

impl RenderSession {
    pub fn slug(&self) -> &str {
        &self.dataset.slug
    }

    pub fn output_path(&self, width: u32, height: u32) -> PathBuf {
        self.config
            .movie
            .output_dir
            .join(format!("{}-{width}x{height}.mp4", self.dataset.slug))
    }

    pub async fn render(&self, width: u32, height: u32) -> MovieResult<MovieArtifact> {
        let output = self.output_path(width, height);
        self.render_to(width, height, &output).await
    }

    pub async fn render_to(
        &self,
        width: u32,
        height: u32,
        output: &Path,
    ) -> MovieResult<MovieArtifact> {
        let mut renderer = self.renderer.lock().await;
        renderer.set_viewport(width, height).await?;

        let ctx = AssemblyContext {
            slug: &self.dataset.slug,
            renderer: &mut **renderer,
            narration: &self.narration,
            captions: &*self.dataset.captions,
            encoder: &self.encoder,
            background: &self.config.movie.background_image,
            work_dir: &self.config.movie.work_dir,
            settle: self.config.renderer.settle_interval(),
        };
        let movie = MovieAssembler::new(ctx, width, height)
            .render(output)
            .await?;
        drop(renderer);

        let sha256 = compute_sha256(&movie.output).await?;
        Ok(MovieArtifact {
            slug: self.dataset.slug.clone(),
            width,
            height,
            path: movie.output,
            duration_seconds: movie.duration_seconds,
            segment_count: movie.segments.len(),
            segments: movie.segments,
            sha256,
            rendered_at: Utc::now(),
        })
    }

    pub async fn close(self) -> MovieResult<()> {
        let mut renderer = self.renderer.into_inner();
        renderer.shutdown().await?;
        Ok(())
    }
}

async fn compute_sha256(path: &Path) -> MovieResult<String> {
    let bytes = fs::read(path).await.map_err(|source| MovieError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(hex_encode(hasher.finalize()))
}
