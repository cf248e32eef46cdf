// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Avatar video generation job.
//!
//! A job narrates the script, submits it to the video provider and then
//! polls the provider until it reports a result, a failure, or the attempt
//! ceiling is reached. Every state change is published on a
//! `watch` channel so a UI can render progress.

use crate::config::Config;
use crate::error::{AppError, ProviderError, Result};
use crate::models::{GenerationJob, JobPhase, ProviderJobStatus, VideoRequest, VideoStatusResponse};
use crate::services::video::{VideoGenerator, VideoOptions};
use crate::services::voice::VoiceSynthesizer;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use validator::Validate;

/// Poll cadence and ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(crate::config::DEFAULT_VIDEO_POLL_INTERVAL_SECS),
            max_attempts: crate::config::DEFAULT_VIDEO_MAX_POLLS,
        }
    }
}

impl From<&Config> for PollConfig {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.video_poll_interval,
            max_attempts: config.video_max_polls,
        }
    }
}

/// What to do after one status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Continue,
    Ready(String),
    Failed(String),
}

/// Decide the next step from one status response.
///
/// A finished status without a result URL keeps polling.
pub fn evaluate_poll(status: &VideoStatusResponse) -> PollOutcome {
    match (&status.status, &status.result_url) {
        (s, Some(url)) if s.is_done() => PollOutcome::Ready(url.clone()),
        (ProviderJobStatus::Failed, _) => PollOutcome::Failed(
            status
                .error_message
                .clone()
                .unwrap_or_else(|| AppError::VIDEO_FAILED_FALLBACK.to_string()),
        ),
        _ => PollOutcome::Continue,
    }
}

/// Resolve `fut` unless `cancel` fires first.
async fn or_cancelled<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        value = fut => Ok(value),
    }
}

/// Drives one job at a time against injected providers.
pub struct VideoJobRunner {
    voice: Arc<dyn VoiceSynthesizer>,
    video: Arc<dyn VideoGenerator>,
    poll: PollConfig,
}

impl VideoJobRunner {
    pub fn new(
        voice: Arc<dyn VoiceSynthesizer>,
        video: Arc<dyn VideoGenerator>,
        poll: PollConfig,
    ) -> Self {
        Self { voice, video, poll }
    }

    /// Run a job to completion.
    ///
    /// The final [`GenerationJob`] is published on `progress` whether the job
    /// succeeds or not; the returned error carries the same message.
    pub async fn run(
        &self,
        request: VideoRequest,
        cancel: CancellationToken,
        progress: watch::Sender<GenerationJob>,
    ) -> Result<GenerationJob> {
        let mut job = GenerationJob::default();
        progress.send_replace(job.clone());

        match self.drive(&request, &cancel, &mut job, &progress).await {
            Ok(url) => {
                job.phase = JobPhase::Ready;
                job.progress = 100;
                job.result_url = Some(url);
                progress.send_replace(job.clone());
                tracing::info!(job_id = ?job.job_id, attempts = job.attempts, "Video ready");
                Ok(job)
            }
            Err(e) => {
                job.phase = match e {
                    AppError::Cancelled => JobPhase::Cancelled,
                    AppError::VideoTimeout => JobPhase::TimedOut,
                    _ => JobPhase::Failed,
                };
                job.error_message = Some(e.to_string());
                progress.send_replace(job.clone());
                tracing::warn!(
                    job_id = ?job.job_id,
                    phase = ?job.phase,
                    error = %e,
                    "Video generation ended without a result"
                );
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        request: &VideoRequest,
        cancel: &CancellationToken,
        job: &mut GenerationJob,
        progress: &watch::Sender<GenerationJob>,
    ) -> Result<String> {
        request.validate().map_err(|e| {
            let message = e
                .field_errors()
                .into_values()
                .flatten()
                .find_map(|err| err.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "Invalid video request".to_string());
            AppError::BadRequest(message)
        })?;

        job.phase = JobPhase::SynthesizingAudio;
        progress.send_replace(job.clone());
        let audio_url = or_cancelled(
            cancel,
            self.voice.synthesize(&request.script, &request.voice_id),
        )
        .await?
        .map_err(ProviderError::into_app_error)?;
        job.audio_url = Some(audio_url);

        job.phase = JobPhase::Submitting;
        progress.send_replace(job.clone());
        let options = VideoOptions {
            title: request.title.clone(),
            background_url: None,
        };
        let job_id = or_cancelled(
            cancel,
            self.video.submit(&request.script, &request.avatar_id, &options),
        )
        .await?
        .map_err(ProviderError::into_app_error)?;
        tracing::info!(job_id = %job_id, "Video job submitted");

        job.job_id = Some(job_id.clone());
        job.phase = JobPhase::Polling;
        progress.send_replace(job.clone());

        while job.attempts < self.poll.max_attempts {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            or_cancelled(cancel, tokio::time::sleep(self.poll.interval)).await?;

            let status = or_cancelled(cancel, self.video.status(&job_id))
                .await?
                .map_err(ProviderError::into_app_error)?;

            job.attempts += 1;
            job.progress = status.progress;
            progress.send_replace(job.clone());

            match evaluate_poll(&status) {
                PollOutcome::Continue => {
                    tracing::debug!(
                        job_id = %job_id,
                        attempt = job.attempts,
                        status = ?status.status,
                        "Video still generating"
                    );
                }
                PollOutcome::Ready(url) => return Ok(url),
                PollOutcome::Failed(message) => return Err(AppError::VideoFailed(message)),
            }
        }

        Err(AppError::VideoTimeout)
    }
}

struct ActiveJob {
    seq: u64,
    cancel: CancellationToken,
}

/// Owns at most one running job.
///
/// Starting a generation cancels whatever job was running before it, and
/// only the newest job's state reaches subscribers.
pub struct VideoStudio {
    runner: Arc<VideoJobRunner>,
    active: Mutex<Option<ActiveJob>>,
    next_seq: AtomicU64,
    progress: watch::Sender<GenerationJob>,
}

impl VideoStudio {
    pub fn new(runner: Arc<VideoJobRunner>) -> Self {
        let (progress, _) = watch::channel(GenerationJob::default());
        Self {
            runner,
            active: Mutex::new(None),
            next_seq: AtomicU64::new(0),
            progress,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationJob> {
        self.progress.subscribe()
    }

    pub fn current(&self) -> GenerationJob {
        self.progress.borrow().clone()
    }

    /// Abort the running job, if any. Its `cancelled` state is still
    /// published.
    pub fn cancel(&self) {
        if let Some(active) = self.lock_active().as_ref() {
            tracing::info!(seq = active.seq, "Cancelling video job");
            active.cancel.cancel();
        }
    }

    /// Start a new job, superseding any running one, and wait for it.
    pub async fn generate(&self, request: VideoRequest) -> Result<GenerationJob> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        if let Some(previous) = self.lock_active().replace(ActiveJob {
            seq,
            cancel: cancel.clone(),
        }) {
            tracing::info!(previous = previous.seq, seq, "Superseding running video job");
            previous.cancel.cancel();
        }

        let (tx, mut rx) = watch::channel(GenerationJob::default());
        let run = self.runner.run(request, cancel, tx);
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break run.await;
                    }
                    let state = rx.borrow_and_update().clone();
                    self.publish_if_current(seq, state);
                }
            }
        };

        let final_state = rx.borrow().clone();
        self.publish_if_current(seq, final_state);

        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|a| a.seq == seq) {
            *active = None;
        }

        result
    }

    fn publish_if_current(&self, seq: u64, state: GenerationJob) {
        if self.lock_active().as_ref().is_some_and(|a| a.seq == seq) {
            self.progress.send_replace(state);
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(token: &str, url: Option<&str>, error: Option<&str>) -> VideoStatusResponse {
        VideoStatusResponse {
            status: ProviderJobStatus::parse(token),
            progress: 0,
            result_url: url.map(str::to_string),
            error_message: error.map(str::to_string),
        }
    }

    #[test]
    fn test_ready_needs_url() {
        assert_eq!(
            evaluate_poll(&status("ready", Some("u"), None)),
            PollOutcome::Ready("u".to_string())
        );
        assert_eq!(
            evaluate_poll(&status("completed", Some("u"), None)),
            PollOutcome::Ready("u".to_string())
        );
        assert_eq!(
            evaluate_poll(&status("completed", None, None)),
            PollOutcome::Continue
        );
    }

    #[test]
    fn test_failed_message() {
        assert_eq!(
            evaluate_poll(&status("failed", None, Some("quota exceeded"))),
            PollOutcome::Failed("quota exceeded".to_string())
        );
        assert_eq!(
            evaluate_poll(&status("failed", None, None)),
            PollOutcome::Failed("Video generation failed".to_string())
        );
    }

    #[test]
    fn test_generating_continues() {
        assert_eq!(
            evaluate_poll(&status("generating", None, None)),
            PollOutcome::Continue
        );
        assert_eq!(
            evaluate_poll(&status("queued", Some("u"), None)),
            PollOutcome::Continue
        );
    }

    #[test]
    fn test_poll_config_defaults() {
        let poll = PollConfig::default();
        assert_eq!(poll.interval, Duration::from_secs(4));
        assert_eq!(poll.max_attempts, 300);
    }
}
