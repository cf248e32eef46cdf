// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Voice synthesis (ElevenLabs) client.
//!
//! Handles:
//! - Text-to-speech, returned as a self-contained `data:` URL
//! - Voice listing with a built-in fallback list
//! - Best-effort reporting of API reachability for the signed-in user

use crate::error::ProviderError;
use crate::services::api_status::{ApiStatusReporter, ELEVENLABS_SERVICE};
use crate::services::identity::IdentityProvider;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const MODEL_ID: &str = "eleven_monolingual_v1";
const OUTPUT_FORMAT: &str = "mp3_44100_128";

/// Default narrator voice ("Rachel").
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    /// Speak `text` with `voice_id`; returns a playable audio URL.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Voices offered when the API cannot be reached.
pub fn fallback_voices() -> Vec<Voice> {
    [
        ("rachel", "Rachel", "Female"),
        ("domi", "Domi", "Female"),
        ("bella", "Bella", "Female"),
        ("antoni", "Antoni", "Male"),
        ("elli", "Elli", "Female"),
        ("josh", "Josh", "Male"),
        ("arnold", "Arnold", "Male"),
        ("adam", "Adam", "Male"),
        ("sam", "Sam", "Male"),
    ]
    .into_iter()
    .map(|(id, name, category)| Voice {
        voice_id: id.to_string(),
        name: name.to_string(),
        category: Some(category.to_string()),
    })
    .collect()
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Encode raw MP3 bytes as a `data:` URL.
pub fn audio_data_url(bytes: &[u8]) -> String {
    format!("data:audio/mpeg;base64,{}", BASE64.encode(bytes))
}

/// ElevenLabs REST client.
#[derive(Clone)]
pub struct ElevenLabsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    status: Option<(ApiStatusReporter, Arc<dyn IdentityProvider>)>,
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(ProviderError::transport)?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            status: None,
        })
    }

    /// Report reachability after each synthesis for the signed-in user.
    pub fn with_status_reporter(
        mut self,
        reporter: ApiStatusReporter,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        self.status = Some((reporter, identity));
        self
    }

    /// True when the voices endpoint answers successfully.
    pub async fn test_connection(&self) -> bool {
        match self.fetch_voices().await {
            Ok(_) => {
                tracing::info!("ElevenLabs API connection successful");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "ElevenLabs API connection failed");
                false
            }
        }
    }

    /// Available voices, or the built-in list when the API is unavailable.
    pub async fn list_voices(&self) -> Vec<Voice> {
        match self.fetch_voices().await {
            Ok(voices) if !voices.is_empty() => voices,
            Ok(_) => fallback_voices(),
            Err(e) => {
                tracing::warn!(error = %e, "ElevenLabs API error, falling back to built-in voices");
                fallback_voices()
            }
        }
    }

    async fn fetch_voices(&self) -> Result<Vec<Voice>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/voices", self.base_url))
            .header("Accept", "application/json")
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let parsed: VoicesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("JSON parse error: {}", e)))?;
        Ok(parsed.voices)
    }

    async fn report_status(&self, connected: bool) {
        let Some((reporter, identity)) = &self.status else {
            return;
        };
        match identity.get_session().await {
            Ok(Some(session)) => {
                reporter
                    .report(&session.access_token, ELEVENLABS_SERVICE, connected)
                    .await
            }
            Ok(None) => tracing::debug!("No session, skipping API status report"),
            Err(e) => tracing::warn!(error = %e, "No token available for API status report"),
        }
    }
}

#[async_trait]
impl VoiceSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<String, ProviderError> {
        tracing::info!(voice_id, chars = text.len(), "Generating voice");

        let body = SpeechRequest {
            text,
            model_id: MODEL_ID,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
                style: 0.0,
                use_speaker_boost: true,
            },
        };

        let response = self
            .http
            .post(format!(
                "{}/text-to-speech/{}",
                self.base_url,
                urlencoding::encode(voice_id)
            ))
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let err = ProviderError::from_response(response).await;
            tracing::error!(status = %status, error = %err, "ElevenLabs API error");
            self.report_status(false).await;
            return Err(ProviderError {
                message: format!(
                    "Failed to generate voice: {}",
                    status.canonical_reason().unwrap_or("request failed")
                ),
                ..err
            });
        }

        let bytes = response.bytes().await.map_err(ProviderError::transport)?;
        self.report_status(true).await;

        tracing::info!(bytes = bytes.len(), "Voice generation successful");
        Ok(audio_data_url(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_data_url() {
        assert_eq!(audio_data_url(b"ID3"), "data:audio/mpeg;base64,SUQz");
    }

    #[test]
    fn test_fallback_voices() {
        let voices = fallback_voices();
        assert_eq!(voices.len(), 9);
        assert_eq!(voices[0].voice_id, "rachel");
    }

    #[test]
    fn test_speech_request_shape() {
        let body = SpeechRequest {
            text: "hi",
            model_id: MODEL_ID,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
                style: 0.0,
                use_speaker_boost: true,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model_id"], "eleven_monolingual_v1");
        assert_eq!(json["voice_settings"]["use_speaker_boost"], true);
    }
}
