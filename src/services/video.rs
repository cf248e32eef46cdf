// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Avatar video provider (Tavus) client.

use crate::error::ProviderError;
use crate::models::VideoStatusResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://tavusapi.com/v2";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra settings for one video.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_url: Option<String>,
}

/// Job-based video generation API.
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Start a job; returns the provider's job id.
    async fn submit(
        &self,
        script: &str,
        avatar_id: &str,
        options: &VideoOptions,
    ) -> Result<String, ProviderError>;

    async fn status(&self, job_id: &str) -> Result<VideoStatusResponse, ProviderError>;
}

#[derive(Serialize)]
struct CreateVideoRequest<'a> {
    replica_id: &'a str,
    script: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    background_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct CreateVideoResponse {
    video_id: String,
}

/// Tavus REST client.
#[derive(Clone)]
pub struct TavusClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TavusClient {
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
        })
    }

    /// Check response status and return the provider's error if not successful.
    async fn check_response(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let err = ProviderError::from_response(response).await;
        if err.status == Some(429) {
            tracing::warn!("Tavus rate limit hit (429)");
        }
        Err(err)
    }
}

#[async_trait]
impl VideoGenerator for TavusClient {
    async fn submit(
        &self,
        script: &str,
        avatar_id: &str,
        options: &VideoOptions,
    ) -> Result<String, ProviderError> {
        let body = CreateVideoRequest {
            replica_id: avatar_id,
            script,
            video_name: options.title.as_deref(),
            background_url: options.background_url.as_deref(),
        };

        let response = self
            .http
            .post(format!("{}/videos", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        let created: CreateVideoResponse = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("JSON parse error: {}", e)))?;

        Ok(created.video_id)
    }

    async fn status(&self, job_id: &str) -> Result<VideoStatusResponse, ProviderError> {
        let response = self
            .http
            .get(format!(
                "{}/videos/{}",
                self.base_url,
                urlencoding::encode(job_id)
            ))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        let raw: serde_json::Value = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("JSON parse error: {}", e)))?;

        Ok(VideoStatusResponse::from_value(&raw))
    }
}
