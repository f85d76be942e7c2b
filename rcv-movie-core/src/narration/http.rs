use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::debug;
use url::Url;

use crate::config::NarrationSection;

use super::error::{NarrationError, NarrationResult};
use super::{NarrationAudio, NarrationBackend, NarrationBackendFactory, NarrationJob};

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    text: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// What a single poll tells the job loop to do next.
#[derive(Debug, PartialEq)]
enum PollOutcome {
    Wait,
    Download { audio_url: String, duration: f64 },
}

impl JobStatusResponse {
    fn outcome(self, job_id: &str) -> NarrationResult<PollOutcome> {
        match self.status {
            JobStatus::Pending | JobStatus::Running => Ok(PollOutcome::Wait),
            JobStatus::Failed => Err(NarrationError::Job {
                job_id: job_id.to_string(),
                message: self.error.unwrap_or_else(|| "unknown failure".into()),
            }),
            JobStatus::Completed => {
                let audio_url = self.audio_url.ok_or_else(|| {
                    NarrationError::Protocol(format!("job {job_id} completed without audio_url"))
                })?;
                let duration = self
                    .duration_seconds
                    .filter(|value| value.is_finite() && *value >= 0.0)
                    .ok_or_else(|| {
                        NarrationError::Protocol(format!(
                            "job {job_id} completed without a valid duration"
                        ))
                    })?;
                Ok(PollOutcome::Download {
                    audio_url,
                    duration,
                })
            }
        }
    }
}

/// Speech synthesis over a JSON job API.
#[derive(Debug, Clone)]
pub struct HttpNarrationBackend {
    client: reqwest::Client,
    endpoint: Url,
    config: Arc<NarrationSection>,
}

impl HttpNarrationBackend {
    pub fn new(config: NarrationSection) -> NarrationResult<Self> {
        let mut endpoint = Url::parse(&config.endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let mut builder = reqwest::Client::builder().user_agent("rcv-movie/0.1");
        if let Some(seconds) = config.request_timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        Ok(Self {
            client: builder.build()?,
            endpoint,
            config: Arc::new(config),
        })
    }

    fn jobs_url(&self) -> NarrationResult<Url> {
        Ok(self.endpoint.join("jobs")?)
    }
}

#[async_trait]
impl NarrationBackend for HttpNarrationBackend {
    async fn submit(&self, text: &str) -> NarrationResult<Box<dyn NarrationJob>> {
        let response = self
            .client
            .post(self.jobs_url()?)
            .json(&SubmitRequest {
                text,
                format: &self.config.audio_format,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NarrationError::Protocol(format!(
                "unexpected status {} submitting narration",
                response.status()
            )));
        }
        let SubmitResponse { job_id } = response.json().await?;
        debug!(%job_id, "narration job accepted");
        Ok(Box::new(HttpNarrationJob {
            backend: self.clone(),
            job_id,
        }))
    }
}

struct HttpNarrationJob {
    backend: HttpNarrationBackend,
    job_id: String,
}

impl HttpNarrationJob {
    async fn poll_until_ready(&self) -> NarrationResult<NarrationAudio> {
        let status_url = self.backend.endpoint.join(&format!("jobs/{}", self.job_id))?;
        let interval = Duration::from_millis(self.backend.config.poll_interval_ms);
        loop {
            let response = self
                .backend
                .client
                .get(status_url.clone())
                .send()
                .await?
                .error_for_status()?;
            let status: JobStatusResponse = response.json().await?;
            match status.outcome(&self.job_id)? {
                PollOutcome::Wait => sleep(interval).await,
                PollOutcome::Download {
                    audio_url,
                    duration,
                } => {
                    let url = self.backend.endpoint.join(&audio_url)?;
                    let bytes = self
                        .backend
                        .client
                        .get(url)
                        .send()
                        .await?
                        .error_for_status()?
                        .bytes()
                        .await?;
                    debug!(job_id = %self.job_id, bytes = bytes.len(), duration, "narration audio downloaded");
                    return Ok(NarrationAudio {
                        bytes: bytes.to_vec(),
                        duration_seconds: duration,
                        format: self.backend.config.audio_format.clone(),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl NarrationJob for HttpNarrationJob {
    async fn await_audio(self: Box<Self>) -> NarrationResult<NarrationAudio> {
        let seconds = self.backend.config.timeout_seconds;
        match timeout(Duration::from_secs(seconds), self.poll_until_ready()).await {
            Ok(result) => result,
            Err(_) => Err(NarrationError::Timeout {
                job_id: self.job_id.clone(),
                seconds,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpNarrationFactory {
    config: NarrationSection,
}

impl HttpNarrationFactory {
    pub fn new(config: NarrationSection) -> Self {
        Self { config }
    }
}

impl NarrationBackendFactory for HttpNarrationFactory {
    fn build(&self) -> NarrationResult<Arc<dyn NarrationBackend>> {
        Ok(Arc::new(HttpNarrationBackend::new(self.config.clone())?))
    }
}
