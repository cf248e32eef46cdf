//! Text generation (Gemini) client.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const EMPTY_RESPONSE_TEXT: &str = "No content generated.";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Prompt used by the content generator page.
pub fn content_prompt(kind: &str, niche: &str, platform: &str, context: &str) -> String {
    let mut prompt = format!("Generate {} for the {} niche on {}.", kind, niche, platform);
    let context = context.trim();
    if !context.is_empty() {
        prompt.push_str(" Additional context: ");
        prompt.push_str(context);
    }
    prompt
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    /// `candidates[0].content.parts[0].text`
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|t| !t.is_empty())
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_api_url(api_key, DEFAULT_API_URL)
    }

    /// Client posting to a different `generateContent` endpoint.
    pub fn with_api_url(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(ProviderError::transport)?;

        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(&self.api_url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        if !response.status().is_success() {
            let err = ProviderError::from_response(response).await;
            tracing::error!(error = %err, "Gemini request failed");
            return Err(ProviderError {
                message: "Failed to generate content from Gemini API".to_string(),
                ..err
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("JSON parse error: {}", e)))?;

        Ok(parsed
            .first_text()
            .unwrap_or_else(|| EMPTY_RESPONSE_TEXT.to_string()))
    }
}
