use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use tempfile::TempDir;
use tokio::process::Command;

use rcv_movie_core::caption::{CaptionError, CaptionSource, RoundCaption};
use rcv_movie_core::config::{load_movie_config, MovieConfig};
use rcv_movie_core::media::{CommandExecutor, MediaEncoder, TextStyle};
use rcv_movie_core::movie::{
    AssemblyContext, AssemblyState, DatasetRef, MovieAssembler, MovieError,
    RenderSessionFactory, SegmentKind,
};
use rcv_movie_core::narration::{
    NarrationAudio, NarrationBackend, NarrationBackendFactory, NarrationError, NarrationJob,
    NarrationRequester, NarrationResult,
};
use rcv_movie_core::renderer::{
    RendererError, RendererLauncher, RendererResult, RendererSession,
};

type Log = Arc<Mutex<Vec<String>>>;

fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(relative)
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn position(log: &[String], entry: &str) -> usize {
    log.iter()
        .position(|candidate| candidate == entry)
        .unwrap_or_else(|| panic!("{entry} not logged in {log:?}"))
}

fn spoken_duration(text: &str) -> f64 {
    0.5 + text.chars().count() as f64 * 0.01
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

struct ScriptedRenderer {
    log: Log,
    fail_round: Option<usize>,
    viewport: (u32, u32),
}

#[async_trait]
impl RendererSession for ScriptedRenderer {
    async fn navigate(&mut self, url: &str) -> RendererResult<()> {
        self.log.lock().unwrap().push(format!("navigate:{url}"));
        Ok(())
    }

    async fn set_viewport(&mut self, width: u32, height: u32) -> RendererResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("viewport:{width}x{height}"));
        self.viewport = (width, height);
        Ok(())
    }

    async fn execute_round_transition(&mut self, round_index: usize) -> RendererResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("transition:{round_index}"));
        if self.fail_round == Some(round_index) {
            return Err(RendererError::Script(
                "transitionEachBarForRound is not defined".into(),
            ));
        }
        Ok(())
    }

    async fn capture_viewport(&mut self) -> RendererResult<Vec<u8>> {
        self.log.lock().unwrap().push("capture".into());
        Ok(png_bytes(self.viewport.0.min(64), self.viewport.1.min(64)))
    }

    async fn dump_page_state(&mut self) -> RendererResult<String> {
        Ok("<html><body>blank display</body></html>".into())
    }
}

struct ScriptedLauncher {
    log: Log,
    fail_round: Option<usize>,
}

#[async_trait]
impl RendererLauncher for ScriptedLauncher {
    async fn launch(&self) -> RendererResult<Box<dyn RendererSession>> {
        self.log.lock().unwrap().push("launch".into());
        Ok(Box::new(ScriptedRenderer {
            log: Arc::clone(&self.log),
            fail_round: self.fail_round,
            viewport: (1280, 720),
        }))
    }
}

struct ScriptedNarration {
    log: Log,
    fail_text: Option<String>,
}

struct ScriptedJob {
    text: String,
    fail: bool,
}

#[async_trait]
impl NarrationBackend for ScriptedNarration {
    async fn submit(&self, text: &str) -> NarrationResult<Box<dyn NarrationJob>> {
        self.log.lock().unwrap().push(format!("submit:{text}"));
        Ok(Box::new(ScriptedJob {
            text: text.to_string(),
            fail: self.fail_text.as_deref() == Some(text),
        }))
    }
}

#[async_trait]
impl NarrationJob for ScriptedJob {
    async fn await_audio(self: Box<Self>) -> NarrationResult<NarrationAudio> {
        if self.fail {
            return Err(NarrationError::Job {
                job_id: "job-42".into(),
                message: "voice model overloaded".into(),
            });
        }
        Ok(NarrationAudio {
            bytes: self.text.as_bytes().to_vec(),
            duration_seconds: spoken_duration(&self.text),
            format: "mp3".into(),
        })
    }
}

struct ScriptedCaptions {
    log: Log,
    rounds: Vec<String>,
    reported_rounds: Option<i64>,
}

impl CaptionSource for ScriptedCaptions {
    fn round_count(&self) -> i64 {
        self.reported_rounds.unwrap_or(self.rounds.len() as i64)
    }

    fn describe_round(&self, round_index: usize) -> Result<RoundCaption, CaptionError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("describe:{round_index}"));
        self.rounds
            .get(round_index)
            .cloned()
            .map(RoundCaption::Paragraph)
            .ok_or(CaptionError::RoundOutOfRange {
                round: round_index,
                available: self.rounds.len(),
            })
    }

    fn describe_title(&self) -> String {
        "Springfield City Council".into()
    }
}

#[derive(Default)]
struct RecordingExecutor {
    invocations: Mutex<Vec<Vec<String>>>,
}

impl RecordingExecutor {
    fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();
        if let Some(output) = args.last() {
            std::fs::write(output, b"encoded")?;
        }
        self.invocations.lock().unwrap().push(args);
        Ok(Output {
            status: success_status(),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

#[cfg(unix)]
fn success_status() -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(0)
}

struct Harness {
    _base: TempDir,
    config: MovieConfig,
    log: Log,
    executor: Arc<RecordingExecutor>,
    factory: RenderSessionFactory,
}

impl Harness {
    fn new(fail_round: Option<usize>, fail_text: Option<&str>) -> Self {
        let base = tempfile::tempdir().unwrap();
        let mut config = load_movie_config(fixture_path("configs/movie.toml")).unwrap();
        config.renderer.settle_ms = 0;
        config.movie.work_dir = base.path().join("work");
        config.movie.output_dir = base.path().join("movies");

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let executor = Arc::new(RecordingExecutor::default());
        let encoder = Arc::new(MediaEncoder::new(
            config.ffmpeg.clone(),
            TextStyle::from_movie_section(&config.movie),
            Some(executor.clone() as Arc<dyn CommandExecutor>),
        ));
        let launcher = Arc::new(ScriptedLauncher {
            log: Arc::clone(&log),
            fail_round,
        });
        let backend: Arc<dyn NarrationBackend> = Arc::new(ScriptedNarration {
            log: Arc::clone(&log),
            fail_text: fail_text.map(str::to_string),
        });
        let narration: Arc<dyn NarrationBackendFactory> =
            Arc::new(move || -> NarrationResult<Arc<dyn NarrationBackend>> {
                Ok(Arc::clone(&backend))
            });
        let factory =
            RenderSessionFactory::new(Arc::new(config.clone()), launcher, narration, encoder);
        Self {
            _base: base,
            config,
            log,
            executor,
            factory,
        }
    }

    fn dataset(&self, rounds: &[&str]) -> DatasetRef {
        DatasetRef::new(
            "springfield-2024",
            Arc::new(ScriptedCaptions {
                log: Arc::clone(&self.log),
                rounds: rounds.iter().map(|round| round.to_string()).collect(),
                reported_rounds: None,
            }),
        )
    }

    fn work_dir_is_empty(&self) -> bool {
        match std::fs::read_dir(&self.config.movie.work_dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    fn submissions(&self) -> Vec<String> {
        entries(&self.log)
            .into_iter()
            .filter(|entry| entry.starts_with("submit:"))
            .collect()
    }
}

#[tokio::test]
async fn single_round_movie_has_title_round_and_closing() {
    let harness = Harness::new(None, None);
    let caption = "Alice received the most votes.";
    let session = harness.factory.create(harness.dataset(&[caption])).await.unwrap();
    let artifact = session.render(400, 300).await.unwrap();

    assert_eq!(artifact.segment_count, 3);
    let kinds: Vec<_> = artifact.segments.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![SegmentKind::Title, SegmentKind::Round(0), SegmentKind::Closing]
    );
    let round = &artifact.segments[1];
    assert_eq!(round.heading(), Some("Round 1"));
    assert_eq!(round.body(), Some(caption));
    assert_eq!(round.duration_seconds, spoken_duration(caption));

    let title = &artifact.segments[0];
    assert_eq!(
        title.heading(),
        Some("Ranked Choice Voting Election Results\n\n\nSpringfield City Council")
    );
    let closing = &artifact.segments[2];
    assert_eq!(
        closing.heading(),
        Some("See more details at rcvis.com/visualize=springfield-2024")
    );
    assert_eq!(
        closing.duration_seconds,
        spoken_duration("See more details at R C Vis dot com")
    );

    let expected = spoken_duration(
        "Ranked Choice Voting Election Results\n\n\nSpringfield City Council",
    ) + spoken_duration(caption)
        + spoken_duration("See more details at R C Vis dot com");
    assert!((artifact.duration_seconds - expected).abs() < 1e-9);

    assert_eq!(
        artifact.path,
        harness.config.movie.output_dir.join("springfield-2024-400x300.mp4")
    );
    assert!(artifact.path.exists());
    assert_eq!(artifact.sha256.len(), 64);
    assert!(harness.work_dir_is_empty());
}

#[tokio::test]
async fn every_segment_is_cut_to_its_audio_at_twelve_fps() {
    let harness = Harness::new(None, None);
    let session = harness
        .factory
        .create(harness.dataset(&["Round one.", "Round two is longer."]))
        .await
        .unwrap();
    let artifact = session.render(400, 300).await.unwrap();

    let invocations = harness.executor.invocations();
    // One encode per segment, then the concat.
    assert_eq!(invocations.len(), artifact.segment_count + 1);
    for (args, segment) in invocations.iter().zip(&artifact.segments) {
        let cut = args.iter().position(|arg| arg == "-t").unwrap();
        assert_eq!(args[cut + 1], segment.duration_seconds.to_string());
        let rate = args.iter().position(|arg| arg == "-framerate").unwrap();
        assert_eq!(args[rate + 1], "12");
        let filter = args.iter().position(|arg| arg == "-filter_complex").unwrap();
        assert!(args[filter + 1].contains("scale=400:300"));
    }
    let concat = invocations.last().unwrap();
    let filter = concat.iter().position(|arg| arg == "-filter_complex").unwrap();
    assert!(concat[filter + 1].ends_with(&format!(
        "concat=n={}:v=1:a=1[vout][aout]",
        artifact.segment_count
    )));
    assert!(!concat.iter().any(|arg| arg == "copy"));
    assert!(concat.last().unwrap().ends_with("springfield-2024-400x300.partial.mp4"));
}

#[tokio::test]
async fn narration_is_submitted_before_each_capture() {
    let harness = Harness::new(None, None);
    let rounds = ["First count.", "Bob is eliminated.", "Alice wins."];
    let session = harness.factory.create(harness.dataset(&rounds)).await.unwrap();
    session.render(400, 300).await.unwrap();

    let log = entries(&harness.log);
    for (index, caption) in rounds.iter().enumerate() {
        let submitted = position(&log, &format!("submit:{caption}"));
        let transition = position(&log, &format!("transition:{index}"));
        assert!(submitted < transition, "round {index} captured before narration");
        assert!(position(&log, &format!("describe:{index}")) < submitted);
    }
    let transitions: Vec<_> = log
        .iter()
        .filter(|entry| entry.starts_with("transition:"))
        .cloned()
        .collect();
    assert_eq!(transitions, ["transition:0", "transition:1", "transition:2"]);
}

#[tokio::test]
async fn round_caption_is_used_verbatim_for_body_and_narration() {
    let harness = Harness::new(None, None);
    let bob = "Bob was eliminated. His 812 votes were redistributed.";
    let session = harness
        .factory
        .create(harness.dataset(&["Nobody has a majority.", bob, "Alice wins."]))
        .await
        .unwrap();
    let artifact = session.render(400, 300).await.unwrap();

    assert!(entries(&harness.log).contains(&"describe:1".to_string()));
    let round = &artifact.segments[2];
    assert_eq!(round.kind, SegmentKind::Round(1));
    assert_eq!(round.heading(), Some("Round 2"));
    assert_eq!(round.body(), Some(bob));
    assert!(harness.submissions().contains(&format!("submit:{bob}")));
}

#[tokio::test]
async fn transition_fault_fails_without_output() {
    let harness = Harness::new(Some(1), None);
    let session = harness
        .factory
        .create(harness.dataset(&["One.", "Two.", "Three."]))
        .await
        .unwrap();
    let err = session.render(400, 300).await.unwrap_err();

    match &err {
        MovieError::RenderTransitionFailure {
            round,
            message,
            page_state,
        } => {
            assert_eq!(*round, 1);
            assert!(message.contains("transitionEachBarForRound is not defined"));
            assert!(page_state.contains("blank display"));
        }
        other => panic!("unexpected error: {other}"),
    }
    let shown = err.to_string();
    assert!(shown.starts_with("renderer failed to transition to round 2: "));
    assert!(shown.contains("commonly occurs with Xvfb issues"));
    assert!(shown.contains("Current page state:"));
    assert!(!session.output_path(400, 300).exists());
    assert!(harness.executor.invocations().is_empty());
    assert!(harness.work_dir_is_empty());
    assert!(!entries(&harness.log).contains(&"transition:2".to_string()));
}

#[tokio::test]
async fn empty_caption_is_still_narrated_once() {
    let harness = Harness::new(None, None);
    let session = harness.factory.create(harness.dataset(&[""])).await.unwrap();
    let artifact = session.render(400, 300).await.unwrap();

    let empty: Vec<_> = harness
        .submissions()
        .into_iter()
        .filter(|entry| entry == "submit:")
        .collect();
    assert_eq!(empty.len(), 1);
    assert_eq!(harness.submissions().len(), 3);
    assert_eq!(artifact.segments[1].duration_seconds, spoken_duration(""));
    assert!(artifact.segments[1].duration_seconds > 0.0);
}

#[tokio::test]
async fn resolutions_share_one_navigation_and_identical_timing() {
    let harness = Harness::new(None, None);
    let session = harness
        .factory
        .create(harness.dataset(&["Nobody has a majority.", "Alice wins."]))
        .await
        .unwrap();
    let small = session.render(400, 300).await.unwrap();
    let large = session.render(1200, 800).await.unwrap();

    assert_eq!(small.segments, large.segments);
    assert_eq!(small.segment_count, large.segment_count);
    assert_eq!((large.width, large.height), (1200, 800));
    assert_ne!(small.path, large.path);

    let log = entries(&harness.log);
    assert_eq!(log.iter().filter(|e| *e == "launch").count(), 1);
    assert_eq!(
        log.iter().filter(|e| e.starts_with("navigate:")).count(),
        1
    );
    assert!(log.contains(&"navigate:https://www.rcvis.com/movie/generate/springfield-2024".to_string()));
    assert!(position(&log, "viewport:400x300") < position(&log, "viewport:1200x800"));
}

#[tokio::test]
async fn concurrent_renders_on_one_session_run_one_after_another() {
    let harness = Harness::new(None, None);
    let rounds = ["First count.", "Bob is eliminated.", "Alice wins."];
    let session = harness.factory.create(harness.dataset(&rounds)).await.unwrap();

    let (small, large) = tokio::join!(session.render(400, 300), session.render(1200, 800));
    let (small, large) = (small.unwrap(), large.unwrap());
    assert_eq!(small.segments, large.segments);
    assert!(small.path.exists());
    assert!(large.path.exists());

    let log = entries(&harness.log);
    let viewports: Vec<usize> = log
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.starts_with("viewport:"))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(viewports.len(), 2);
    let transitions: Vec<usize> = log
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.starts_with("transition:"))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(transitions.len(), rounds.len() * 2);

    // Every round of the first render finishes before the second resizes.
    let (first, second) = transitions.split_at(rounds.len());
    assert!(first.iter().all(|&t| t > viewports[0] && t < viewports[1]));
    assert!(second.iter().all(|&t| t > viewports[1]));
    let order: Vec<&str> = transitions.iter().map(|&t| log[t].as_str()).collect();
    assert_eq!(
        order,
        vec![
            "transition:0", "transition:1", "transition:2",
            "transition:0", "transition:1", "transition:2",
        ]
    );

    // Both encodes ran, each ending in its own concat.
    let invocations = harness.executor.invocations();
    assert_eq!(invocations.len(), 2 * (small.segment_count + 1));
    let outputs: Vec<&String> = invocations
        .iter()
        .filter(|args| args.iter().any(|arg| arg.contains("concat=n=")))
        .filter_map(|args| args.last())
        .collect();
    assert_eq!(outputs.len(), 2);
    assert_ne!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn zero_rounds_is_rejected_before_any_segment() {
    for reported in [0, -3] {
        let harness = Harness::new(None, None);
        let dataset = DatasetRef::new(
            "empty",
            Arc::new(ScriptedCaptions {
                log: Arc::clone(&harness.log),
                rounds: Vec::new(),
                reported_rounds: Some(reported),
            }),
        );
        let session = harness.factory.create(dataset).await.unwrap();
        let err = session.render(400, 300).await.unwrap_err();
        assert!(matches!(err, MovieError::InvalidRoundCount(count) if count == reported));
        assert!(harness.submissions().is_empty());
        assert!(harness.executor.invocations().is_empty());
    }
}

#[tokio::test]
async fn narration_errors_propagate_unchanged() {
    let harness = Harness::new(None, Some("Alice wins."));
    let session = harness
        .factory
        .create(harness.dataset(&["Nobody has a majority.", "Alice wins."]))
        .await
        .unwrap();
    let err = session.render(400, 300).await.unwrap_err();
    match err {
        MovieError::Narration(NarrationError::Job { job_id, message }) => {
            assert_eq!(job_id, "job-42");
            assert_eq!(message, "voice model overloaded");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!session.output_path(400, 300).exists());
    assert!(harness.work_dir_is_empty());
}

async fn assemble_directly(
    harness: &Harness,
    renderer: &mut ScriptedRenderer,
    rounds: &[&str],
    output: &Path,
) -> (Result<usize, MovieError>, AssemblyState, Vec<AssemblyState>) {
    let backend = Arc::new(ScriptedNarration {
        log: Arc::clone(&harness.log),
        fail_text: None,
    });
    let narration = NarrationRequester::new(backend);
    let captions = ScriptedCaptions {
        log: Arc::clone(&harness.log),
        rounds: rounds.iter().map(|round| round.to_string()).collect(),
        reported_rounds: None,
    };
    let encoder = MediaEncoder::new(
        harness.config.ffmpeg.clone(),
        TextStyle::from_movie_section(&harness.config.movie),
        Some(harness.executor.clone() as Arc<dyn CommandExecutor>),
    );
    let ctx = AssemblyContext {
        slug: "direct",
        renderer,
        narration: &narration,
        captions: &captions,
        encoder: &encoder,
        background: &harness.config.movie.background_image,
        work_dir: &harness.config.movie.work_dir,
        settle: std::time::Duration::ZERO,
    };
    let mut assembler = MovieAssembler::new(ctx, 400, 300);
    let result = assembler.render(output).await.map(|movie| movie.segments.len());
    (result, assembler.state(), assembler.history().to_vec())
}

#[tokio::test]
async fn assembler_walks_states_in_order() {
    let harness = Harness::new(None, None);
    let mut renderer = ScriptedRenderer {
        log: Arc::clone(&harness.log),
        fail_round: None,
        viewport: (400, 300),
    };
    let output = harness.config.movie.output_dir.join("direct.mp4");
    let (result, state, history) =
        assemble_directly(&harness, &mut renderer, &["One.", "Two."], &output).await;

    assert_eq!(result.unwrap(), 4);
    assert_eq!(state, AssemblyState::Done);
    assert_eq!(
        history,
        vec![
            AssemblyState::Idle,
            AssemblyState::TitleBuilt,
            AssemblyState::RoundsInProgress { round: 0 },
            AssemblyState::RoundsInProgress { round: 1 },
            AssemblyState::ClosingBuilt,
            AssemblyState::Rendering,
            AssemblyState::Done,
        ]
    );
    assert!(output.exists());
}

#[tokio::test]
async fn assembler_fails_from_rounds_in_progress() {
    let harness = Harness::new(None, None);
    let mut renderer = ScriptedRenderer {
        log: Arc::clone(&harness.log),
        fail_round: Some(0),
        viewport: (400, 300),
    };
    let output = harness.config.movie.output_dir.join("direct.mp4");
    let (result, state, history) =
        assemble_directly(&harness, &mut renderer, &["One."], &output).await;

    assert!(matches!(
        result,
        Err(MovieError::RenderTransitionFailure { round: 0, .. })
    ));
    assert_eq!(state, AssemblyState::Failed);
    assert_eq!(
        history[history.len() - 2],
        AssemblyState::RoundsInProgress { round: 0 }
    );
    assert!(!output.exists());
    assert!(harness.work_dir_is_empty());
}
