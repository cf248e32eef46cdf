//! Video generation job model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status token reported by the video provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderJobStatus {
    Generating,
    Ready,
    Completed,
    Failed,
    /// Any token we do not know (`queued`, `rendering`, ...). Treated as running.
    Other(String),
}

impl ProviderJobStatus {
    pub fn parse(token: &str) -> Self {
        match token {
            "generating" => Self::Generating,
            "ready" => Self::Ready,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Ready | Self::Completed)
    }
}

/// One status response, normalized.
///
/// The provider documents `download_url` at the top level but has been seen
/// returning it under `data`; both are accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStatusResponse {
    pub status: ProviderJobStatus,
    pub progress: u8,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

impl VideoStatusResponse {
    /// Normalize a raw status payload.
    pub fn from_value(value: &Value) -> Self {
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .map(ProviderJobStatus::parse)
            .unwrap_or_else(|| ProviderJobStatus::Other(String::new()));

        let progress = value
            .get("progress")
            .and_then(Value::as_f64)
            .map(|p| p.clamp(0.0, 100.0) as u8)
            .unwrap_or(0);

        let result_url = non_empty_str(value.get("download_url")).or_else(|| {
            value
                .get("data")
                .and_then(|data| non_empty_str(data.get("download_url")))
        });

        let error_message = non_empty_str(value.get("error_message"));

        Self {
            status,
            progress,
            result_url,
            error_message,
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Workflow phase of a generation job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    SynthesizingAudio,
    Submitting,
    Polling,
    Ready,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobPhase::Ready | JobPhase::Failed | JobPhase::TimedOut | JobPhase::Cancelled
        )
    }
}

/// Observable state of one video generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationJob {
    pub job_id: Option<String>,
    pub phase: JobPhase,
    pub progress: u8,
    /// Number of status polls issued so far
    pub attempts: u32,
    pub audio_url: Option<String>,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

/// Request for one avatar video.
#[derive(Debug, Clone, PartialEq, Deserialize, validator::Validate)]
pub struct VideoRequest {
    #[validate(length(min = 1, message = "script must not be empty"))]
    pub script: String,
    #[validate(length(min = 1, message = "an avatar must be selected"))]
    pub avatar_id: String,
    #[serde(default = "default_voice_id")]
    #[validate(length(min = 1, message = "a voice must be selected"))]
    pub voice_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

fn default_voice_id() -> String {
    crate::services::voice::DEFAULT_VOICE_ID.to_string()
}
