use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs as async_fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{FfmpegSection, MovieSection};
use crate::movie::{MovieSpec, OverlayRole, Placement, Segment};

use super::{CommandExecutor, MediaError, MediaResult, SystemCommandExecutor};

/// Fraction of the frame height kept clear above North and below South text.
const EDGE_MARGIN: f64 = 0.05;
/// Rough advance width of a glyph relative to its font size.
const GLYPH_WIDTH_RATIO: f64 = 0.55;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextStyle {
    pub font: String,
    pub heading_size: u32,
    pub body_size: u32,
    pub color: String,
}

impl TextStyle {
    pub fn from_movie_section(section: &MovieSection) -> Self {
        Self {
            font: section.font.clone(),
            heading_size: section.heading_font_size,
            body_size: section.body_font_size,
            color: section.text_color.clone(),
        }
    }

    pub fn size_for(&self, role: OverlayRole) -> u32 {
        match role {
            OverlayRole::Heading => self.heading_size,
            OverlayRole::Body => self.body_size,
        }
    }
}

/// Composites segments and the final movie with ffmpeg.
pub struct MediaEncoder {
    config: Arc<FfmpegSection>,
    style: TextStyle,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for MediaEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaEncoder")
            .field("config", &self.config)
            .field("style", &self.style)
            .finish()
    }
}

impl MediaEncoder {
    pub fn new(
        config: FfmpegSection,
        style: TextStyle,
        executor: Option<Arc<dyn CommandExecutor>>,
    ) -> Self {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        Self {
            config: Arc::new(config),
            style,
            executor,
        }
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    /// Renders one segment to `output`, cut to exactly the narration length.
    ///
    /// `overlay_files` holds one wrapped text file per overlay, in overlay order.
    pub async fn encode_segment(
        &self,
        segment: &Segment,
        overlay_files: &[PathBuf],
        spec: &MovieSpec,
        output: &Path,
    ) -> MediaResult<()> {
        let args = self.segment_args(segment, overlay_files, spec, output);
        self.run_ffmpeg(&args).await?;
        debug!(kind = %segment.kind(), duration = segment.duration(), output = %output.display(), "segment encoded");
        Ok(())
    }

    /// Joins `clips` into `output` with one continuous re-encode, so audio and
    /// video restart together at every segment boundary.
    ///
    /// Output is written to a `.partial` sibling and renamed on success, so a
    /// failed run never leaves a file at `output`.
    pub async fn concatenate(
        &self,
        clips: &[PathBuf],
        spec: &MovieSpec,
        output: &Path,
    ) -> MediaResult<()> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                async_fs::create_dir_all(parent)
                    .await
                    .map_err(|source| MediaError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }
        let partial = partial_path(output);
        let args = self.concat_args(clips, spec, &partial);
        if let Err(err) = self.run_ffmpeg(&args).await {
            if let Err(cleanup) = async_fs::remove_file(&partial).await {
                debug!(path = %partial.display(), error = %cleanup, "no partial output to remove");
            }
            return Err(err);
        }
        async_fs::rename(&partial, output)
            .await
            .map_err(|source| MediaError::Io {
                path: output.to_path_buf(),
                source,
            })?;
        info!(output = %output.display(), clips = clips.len(), "movie written");
        Ok(())
    }

    pub fn segment_args(
        &self,
        segment: &Segment,
        overlay_files: &[PathBuf],
        spec: &MovieSpec,
        output: &Path,
    ) -> Vec<String> {
        let fps = spec.frame_rate.to_string();
        let mut args = self.base_args();
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-framerate".to_string(),
            fps.clone(),
            "-i".to_string(),
            segment.visual().path().to_string_lossy().to_string(),
            "-i".to_string(),
            segment.audio().path.to_string_lossy().to_string(),
            "-filter_complex".to_string(),
            self.overlay_filter(segment, overlay_files, spec),
            "-map".to_string(),
            "[vout]".to_string(),
            "-map".to_string(),
            "1:a".to_string(),
            "-t".to_string(),
            format!("{}", segment.duration()),
        ]);
        args.extend(self.encode_args(spec));
        args.push(output.to_string_lossy().to_string());
        args
    }

    pub fn concat_args(&self, clips: &[PathBuf], spec: &MovieSpec, output: &Path) -> Vec<String> {
        let mut args = self.base_args();
        for clip in clips {
            args.push("-i".to_string());
            args.push(clip.to_string_lossy().to_string());
        }
        let inputs: String = (0..clips.len())
            .map(|index| format!("[{index}:v][{index}:a]"))
            .collect();
        args.extend([
            "-filter_complex".to_string(),
            format!("{inputs}concat=n={}:v=1:a=1[vout][aout]", clips.len()),
            "-map".to_string(),
            "[vout]".to_string(),
            "-map".to_string(),
            "[aout]".to_string(),
        ]);
        args.extend(self.encode_args(spec));
        args.extend([
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }

    fn encode_args(&self, spec: &MovieSpec) -> Vec<String> {
        vec![
            "-r".to_string(),
            spec.frame_rate.to_string(),
            "-c:v".to_string(),
            self.config.video_codec.clone(),
            "-preset".to_string(),
            self.config.preset.clone(),
            "-crf".to_string(),
            self.config.crf.to_string(),
            "-pix_fmt".to_string(),
            self.config.pix_fmt.clone(),
            "-c:a".to_string(),
            self.config.audio_codec.clone(),
            "-ar".to_string(),
            self.config.audio_sample_rate.to_string(),
            "-ac".to_string(),
            "2".to_string(),
        ]
    }

    fn overlay_filter(&self, segment: &Segment, overlay_files: &[PathBuf], spec: &MovieSpec) -> String {
        let mut base = format!("[0:v]scale={}:{},setsar=1", spec.width, spec.height);
        // 4:2:0 chroma needs even dimensions.
        let (even_width, even_height) = (spec.width + spec.width % 2, spec.height + spec.height % 2);
        if (even_width, even_height) != (spec.width, spec.height) {
            base.push_str(&format!(",pad={even_width}:{even_height}:0:0"));
        }
        base.push_str("[base]");
        let mut chains = vec![base];
        let mut input = "base".to_string();
        for (index, (overlay, file)) in segment.overlays().iter().zip(overlay_files).enumerate() {
            let label = format!("t{index}");
            chains.push(format!(
                "[{input}]drawtext=textfile={file}:expansion=none:font={font}:fontsize={size}:fontcolor={color}:line_spacing=8:x=(w-text_w)/2:y={y}[{label}]",
                file = filter_option_value(&file.to_string_lossy()),
                font = filter_option_value(&self.style.font),
                size = self.style.size_for(overlay.role),
                color = filter_option_value(&self.style.color),
                y = placement_expression(overlay.placement),
            ));
            input = label;
        }
        chains.push(format!("[{input}]format={}[vout]", self.config.pix_fmt));
        chains.join(";")
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
        ]
    }

    async fn run_ffmpeg(&self, args: &[String]) -> MediaResult<()> {
        let mut command = Command::new(&self.config.ffmpeg);
        command.args(args);
        let output = self
            .executor
            .run(&mut command)
            .await
            .map_err(|source| MediaError::Io {
                path: self.config.ffmpeg.clone(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!(status = ?output.status.code(), "ffmpeg exited with failure");
            return Err(MediaError::CommandFailure {
                command: format!("{} {}", self.config.ffmpeg.display(), args.join(" ")),
                status: output.status.code(),
                stderr,
            });
        }
        Ok(())
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "movie".to_string());
    name.push_str(".partial.");
    name.push_str(
        &output
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".to_string()),
    );
    output.with_file_name(name)
}

fn placement_expression(placement: Placement) -> String {
    match placement {
        Placement::North => format!("h*{EDGE_MARGIN}"),
        Placement::South => format!("h-text_h-h*{EDGE_MARGIN}"),
        Placement::Center => "(h-text_h)/2".to_string(),
    }
}

/// Quotes `value` as a filter option, then escapes it again for the
/// filtergraph parser, which strips one level of quoting first.
fn filter_option_value(value: &str) -> String {
    let quoted = format!("'{}'", value.replace('\'', "'\\''"));
    let mut escaped = String::with_capacity(quoted.len() * 2);
    for c in quoted.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Word-wraps `text` to the number of glyphs that fit across `width` pixels.
/// Existing line breaks are kept.
pub fn wrap_text(text: &str, width: u32, font_size: u32) -> String {
    let columns = ((f64::from(width) * 0.9) / (f64::from(font_size.max(1)) * GLYPH_WIDTH_RATIO))
        .floor()
        .max(8.0) as usize;
    text.split('\n')
        .map(|line| wrap_line(line, columns))
        .collect::<Vec<_>>()
        .join("\n")
}

fn wrap_line(line: &str, columns: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > columns && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    lines.push(current);
    lines.join("\n")
}
