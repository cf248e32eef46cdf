// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Provider adapters return a raw [`ProviderError`]. It is classified once,
//! at the adapter boundary, into a [`ProviderErrorKind`] so that business
//! logic never has to look at provider message strings.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid email or password. Please check your credentials or sign up for a new account.")]
    InvalidCredentials,

    #[error("Email not confirmed")]
    EmailNotConfirmed,

    #[error("Too many login attempts. Please wait a moment and try again.")]
    RateLimited,

    #[error("An account with this email already exists. Please sign in instead.")]
    AlreadyRegistered,

    #[error("Session expired. Please sign in again.")]
    SessionExpired,

    #[error("No user logged in")]
    NotSignedIn,

    #[error("No email address found for the current user.")]
    MissingEmail,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Provider failure surfaced verbatim.
    #[error("{0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(String),

    /// The video provider reported a failed job.
    #[error("{0}")]
    VideoFailed(String),

    #[error("Video generation timed out. Please try again.")]
    VideoTimeout,

    #[error("Video generation was cancelled")]
    Cancelled,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Fallback message when the video provider fails without saying why.
    pub const VIDEO_FAILED_FALLBACK: &'static str = "Video generation failed";

    /// True for errors the user can fix by signing in again.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            AppError::SessionExpired | AppError::NotSignedIn | AppError::Unauthorized
        )
    }
}

/// Error categories a provider failure can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    InvalidCredentials,
    EmailNotConfirmed,
    RateLimited,
    AlreadyRegistered,
    /// The access token was rejected as expired or invalid.
    ExpiredCredential,
    /// Unique-key violation (row already exists).
    Conflict,
    Other,
}

/// Raw failure reported by an external provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Provider-specific error code (`PGRST301`, `23505`, `invalid_grant`, ...).
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Transport-level failure (connection refused, TLS, timeout, decode).
    pub fn transport(err: reqwest::Error) -> Self {
        let mut out = Self::new(err.to_string());
        out.status = err.status().map(|s| s.as_u16());
        out
    }

    /// Build an error from a non-success HTTP response.
    ///
    /// Understands the GoTrue (`msg`, `error_description`, `error_code`) and
    /// PostgREST (`message`, `code`) error bodies; anything else is kept as
    /// raw text.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let parsed: Option<serde_json::Value> = serde_json::from_str(&body).ok();
        let field = |names: &[&str]| -> Option<String> {
            let obj = parsed.as_ref()?;
            names
                .iter()
                .find_map(|n| obj.get(*n).and_then(|v| v.as_str()))
                .map(str::to_string)
        };

        let message = field(&["msg", "message", "error_description", "error"])
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                } else {
                    format!("HTTP {}: {}", status, body)
                }
            });

        let mut err = Self::new(message).with_status(status.as_u16());
        err.code = field(&["error_code", "code"]);
        err
    }

    /// Classify this failure.
    pub fn kind(&self) -> ProviderErrorKind {
        let code = self.code.as_deref().unwrap_or_default();
        let msg = self.message.as_str();

        if code == "PGRST301" || code == "bad_jwt" || msg.contains("JWT expired") {
            return ProviderErrorKind::ExpiredCredential;
        }
        if code == "23505" || self.status == Some(409) {
            return ProviderErrorKind::Conflict;
        }
        if code == "invalid_credentials" || msg.contains("Invalid login credentials") {
            return ProviderErrorKind::InvalidCredentials;
        }
        if code == "email_not_confirmed" || msg.contains("Email not confirmed") {
            return ProviderErrorKind::EmailNotConfirmed;
        }
        if code == "user_already_exists"
            || msg.contains("User already registered")
            || msg.contains("already been registered")
        {
            return ProviderErrorKind::AlreadyRegistered;
        }
        if code == "over_request_rate_limit"
            || self.status == Some(429)
            || msg.contains("Too many requests")
        {
            return ProviderErrorKind::RateLimited;
        }
        ProviderErrorKind::Other
    }

    /// Verbatim translation, used where no category gets special handling.
    pub fn into_app_error(self) -> AppError {
        AppError::Provider(self.message)
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err.kind() {
            ProviderErrorKind::InvalidCredentials => AppError::InvalidCredentials,
            ProviderErrorKind::EmailNotConfirmed => AppError::EmailNotConfirmed,
            ProviderErrorKind::RateLimited => AppError::RateLimited,
            ProviderErrorKind::AlreadyRegistered => AppError::AlreadyRegistered,
            ProviderErrorKind::ExpiredCredential => AppError::SessionExpired,
            ProviderErrorKind::Conflict | ProviderErrorKind::Other => err.into_app_error(),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized | AppError::NotSignedIn => {
                (StatusCode::UNAUTHORIZED, "unauthorized", None)
            }
            AppError::SessionExpired => (StatusCode::UNAUTHORIZED, "session_expired", None),
            AppError::InvalidCredentials | AppError::EmailNotConfirmed => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                Some(self.to_string()),
            ),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", None),
            AppError::AlreadyRegistered => (
                StatusCode::CONFLICT,
                "already_registered",
                Some(self.to_string()),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::MissingEmail => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                Some(self.to_string()),
            ),
            AppError::Provider(msg) | AppError::VideoFailed(msg) => {
                (StatusCode::BAD_GATEWAY, "provider_error", Some(msg.clone()))
            }
            AppError::VideoTimeout => (StatusCode::GATEWAY_TIMEOUT, "timeout", None),
            AppError::Cancelled => (StatusCode::CONFLICT, "cancelled", None),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", Some(msg.clone()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type Result<T> = std::result::Result<T, AppError>;
