// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user third-party API connection status.
//!
//! The server side merges reports into `profiles.api_connections`; the
//! client side ([`ApiStatusReporter`]) posts reports after provider calls.

use crate::db::ProfileStore;
use crate::error::{AppError, Result};
use crate::models::{ApiConnection, AuthUser, ProfileUpdate};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const ELEVENLABS_SERVICE: &str = "elevenlabs";
pub const UPDATE_API_STATUS_PATH: &str = "/functions/v1/update-api-status";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of an API status report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApiStatusRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    /// Kept loose so that a non-boolean value is a 400, not a parse error
    #[serde(default)]
    pub connected: Option<serde_json::Value>,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApiStatusResponse {
    pub success: bool,
    pub service: String,
    pub connected: bool,
    pub last_checked: DateTime<Utc>,
}

/// Server-side handler logic.
#[derive(Clone)]
pub struct ApiStatusService {
    profiles: Arc<dyn ProfileStore>,
    /// Service role key: writes bypass row-level security
    service_token: String,
}

impl ApiStatusService {
    pub fn new(profiles: Arc<dyn ProfileStore>, service_token: impl Into<String>) -> Self {
        Self {
            profiles,
            service_token: service_token.into(),
        }
    }

    /// Record `connected` for `service` on the caller's own profile.
    pub async fn update(
        &self,
        caller: &AuthUser,
        request: UpdateApiStatusRequest,
        now: DateTime<Utc>,
    ) -> Result<UpdateApiStatusResponse> {
        let (user_id, service, connected) = match (
            request.user_id.filter(|s| !s.is_empty()),
            request.service.filter(|s| !s.is_empty()),
            request.connected.as_ref().and_then(serde_json::Value::as_bool),
        ) {
            (Some(u), Some(s), Some(c)) => (u, s, c),
            _ => return Err(AppError::BadRequest("Missing required parameters".to_string())),
        };

        if user_id != caller.id {
            return Err(AppError::Forbidden(
                "Unauthorized to update this user's API status".to_string(),
            ));
        }

        let profile = self
            .profiles
            .find_by_id(&self.service_token, &user_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Error fetching profile for API status");
                AppError::Database("Failed to fetch user profile".to_string())
            })?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Database("Failed to fetch user profile".to_string()))?;

        let last_checked = request.last_checked.unwrap_or(now);
        let mut connections = profile.api_connections;
        connections.insert(
            service.clone(),
            ApiConnection {
                connected,
                last_checked,
            },
        );

        let update = ProfileUpdate {
            api_connections: Some(connections),
            elevenlabs_api_connected: (service == ELEVENLABS_SERVICE).then_some(connected),
            ..ProfileUpdate::default()
        };

        self.profiles
            .update(&self.service_token, &user_id, &update)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Error updating API status");
                AppError::Database("Failed to update API status".to_string())
            })?;

        tracing::info!(
            user_id = %user_id,
            service = %service,
            connected,
            "Updated API status"
        );

        Ok(UpdateApiStatusResponse {
            success: true,
            service,
            connected,
            last_checked,
        })
    }
}

#[derive(Deserialize)]
struct SubjectClaims {
    sub: String,
}

/// Read the `sub` claim of an access token without verifying it.
///
/// Only used to address a status report; the server verifies the token.
pub fn user_id_from_token(token: &str) -> Option<String> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<SubjectClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims.sub)
        .ok()
}

/// Client for the status endpoint. Failures are logged, never returned.
#[derive(Clone)]
pub struct ApiStatusReporter {
    http: reqwest::Client,
    endpoint: String,
}

impl ApiStatusReporter {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}{}",
                base_url.trim_end_matches('/'),
                UPDATE_API_STATUS_PATH
            ),
        })
    }

    pub async fn report(&self, access_token: &str, service: &str, connected: bool) {
        let Some(user_id) = user_id_from_token(access_token) else {
            tracing::warn!("Failed to read user id from access token");
            return;
        };

        let body = UpdateApiStatusRequest {
            user_id: Some(user_id),
            service: Some(service.to_string()),
            connected: Some(serde_json::Value::Bool(connected)),
            last_checked: Some(Utc::now()),
        };

        let result = self
            .http
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(service, connected, "API status reported")
            }
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                tracing::warn!(status = %status, body = %text, "Failed to update API connection status");
            }
            Err(e) => tracing::warn!(error = %e, "Error updating API connection status"),
        }
    }
}
