mod error;
mod http;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

pub use error::{NarrationError, NarrationResult};
pub use http::{HttpNarrationBackend, HttpNarrationFactory, JobStatus, JobStatusResponse};

/// Synthesized speech for one piece of narration text.
#[derive(Clone, PartialEq)]
pub struct NarrationAudio {
    pub bytes: Vec<u8>,
    pub duration_seconds: f64,
    /// File extension of the encoded audio, e.g. `mp3`.
    pub format: String,
}

impl fmt::Debug for NarrationAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrationAudio")
            .field("bytes", &self.bytes.len())
            .field("duration_seconds", &self.duration_seconds)
            .field("format", &self.format)
            .finish()
    }
}

#[async_trait]
pub trait NarrationBackend: Send + Sync {
    /// Enqueues synthesis of `text`. Must return without waiting for the audio.
    async fn submit(&self, text: &str) -> NarrationResult<Box<dyn NarrationJob>>;
}

#[async_trait]
pub trait NarrationJob: Send {
    async fn await_audio(self: Box<Self>) -> NarrationResult<NarrationAudio>;
}

/// Builds one backend per dataset session.
pub trait NarrationBackendFactory: Send + Sync {
    fn build(&self) -> NarrationResult<Arc<dyn NarrationBackend>>;
}

impl<F> NarrationBackendFactory for F
where
    F: Fn() -> NarrationResult<Arc<dyn NarrationBackend>> + Send + Sync,
{
    fn build(&self) -> NarrationResult<Arc<dyn NarrationBackend>> {
        self()
    }
}

/// Front door to the narration backend used by segment building.
///
/// `submit` only waits for the backend to accept the job; the wait for audio
/// runs on its own task so synthesis overlaps with whatever the caller does
/// before calling [`NarrationHandle::await_audio`].
#[derive(Clone)]
pub struct NarrationRequester {
    backend: Arc<dyn NarrationBackend>,
}

impl fmt::Debug for NarrationRequester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrationRequester").finish_non_exhaustive()
    }
}

impl NarrationRequester {
    pub fn new(backend: Arc<dyn NarrationBackend>) -> Self {
        Self { backend }
    }

    pub async fn submit(&self, text: &str) -> NarrationResult<NarrationHandle> {
        debug!(chars = text.chars().count(), "submitting narration");
        let job = self.backend.submit(text).await?;
        let task = tokio::spawn(async move { job.await_audio().await });
        Ok(NarrationHandle { task: Some(task) })
    }
}

/// Pending narration audio. Dropping the handle abandons the job.
#[derive(Debug)]
pub struct NarrationHandle {
    task: Option<JoinHandle<NarrationResult<NarrationAudio>>>,
}

impl NarrationHandle {
    pub async fn await_audio(mut self) -> NarrationResult<NarrationAudio> {
        let task = self
            .task
            .take()
            .ok_or_else(|| NarrationError::Unexpected("narration already awaited".into()))?;
        task.await?
    }
}

impl Drop for NarrationHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
