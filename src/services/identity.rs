// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider (Supabase GoTrue) client.
//!
//! Handles:
//! - Password sign-up / sign-in / sign-out
//! - Verification email resend
//! - In-memory session with refresh when expired
//! - Session-change events for the session manager

use crate::error::ProviderError;
use crate::models::{AuthEvent, AuthSession, AuthUser, SignUpOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const EVENT_CHANNEL_CAPACITY: usize = 32;
/// Refresh a little before the provider would reject the token.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Operations the session manager needs from an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, if any (refreshed when expired).
    async fn get_session(&self) -> Result<Option<AuthSession>, ProviderError>;

    /// Subscribe to session-change events, delivered in emission order.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome, ProviderError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    async fn resend_verification(&self, email: &str) -> Result<(), ProviderError>;

    /// Resolve the identity behind an access token.
    async fn get_user(&self, access_token: &str) -> Result<AuthUser, ProviderError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    email_confirmed_at: Option<DateTime<Utc>>,
}

impl From<GoTrueUser> for AuthUser {
    fn from(u: GoTrueUser) -> Self {
        AuthUser {
            id: u.id,
            email: u.email.unwrap_or_default(),
            updated_at: u.updated_at.unwrap_or(u.created_at),
            created_at: u.created_at,
            email_confirmed_at: u.email_confirmed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: GoTrueUser,
}

impl GoTrueSession {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| self.expires_in.map(|s| now + ChronoDuration::seconds(s)))
            .unwrap_or(now + ChronoDuration::hours(1));

        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Sign-up returns a session when autoconfirm is on, a bare user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(GoTrueSession),
    User(GoTrueUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// SupabaseAuthClient
// ─────────────────────────────────────────────────────────────────────────────

/// GoTrue REST client holding the current session in memory.
pub struct SupabaseAuthClient {
    http: reqwest::Client,
    auth_url: String,
    api_key: String,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseAuthClient {
    /// Create a client for `{supabase_url}/auth/v1`.
    pub fn new(supabase_url: &str, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(ProviderError::transport)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http,
            auth_url: format!("{}/auth/v1", supabase_url.trim_end_matches('/')),
            api_key: api_key.into(),
            session: RwLock::new(None),
            events,
        })
    }

    /// Seed a previously persisted session (e.g. from a token file).
    pub async fn restore_session(&self, session: AuthSession) {
        *self.session.write().await = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session));
    }

    fn emit(&self, event: AuthEvent) {
        tracing::debug!(event = event.name(), "Auth state changed");
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(event);
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .post(format!("{}{}", self.auth_url, path))
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        Self::check_response_json(response).await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        if !response.status().is_success() {
            let err = ProviderError::from_response(response).await;
            tracing::warn!(
                status = ?err.status,
                code = ?err.code,
                error = %err.message,
                "GoTrue request failed"
            );
            return Err(err);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("JSON parse error: {}", e)))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, ProviderError> {
        let raw: GoTrueSession = self
            .post_json(
                "/token?grant_type=refresh_token",
                &serde_json::json!({ "refresh_token": refresh_token }),
            )
            .await?;
        Ok(raw.into_session(Utc::now()))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    async fn get_session(&self) -> Result<Option<AuthSession>, ProviderError> {
        let current = self.session.read().await.clone();
        let Some(session) = current else {
            return Ok(None);
        };

        let margin = ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        if !session.is_expired(Utc::now() + margin) {
            return Ok(Some(session));
        }

        tracing::info!(user_id = %session.user.id, "Access token expired, refreshing");
        match self.refresh(&session.refresh_token).await {
            Ok(fresh) => {
                *self.session.write().await = Some(fresh.clone());
                self.emit(AuthEvent::TokenRefreshed(fresh.clone()));
                Ok(Some(fresh))
            }
            Err(e) => {
                // A dead refresh token means the session is gone for good.
                if e.status.is_some_and(|s| (400..500).contains(&s)) {
                    *self.session.write().await = None;
                    self.emit(AuthEvent::SignedOut);
                }
                Err(e)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome, ProviderError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "data": { "full_name": full_name },
        });

        match self.post_json::<SignUpResponse>("/signup", &body).await? {
            SignUpResponse::Session(raw) => {
                let session = raw.into_session(Utc::now());
                *self.session.write().await = Some(session.clone());
                self.emit(AuthEvent::SignedIn(session.clone()));
                Ok(SignUpOutcome {
                    user: Some(session.user.clone()),
                    session: Some(session),
                })
            }
            SignUpResponse::User(user) => Ok(SignUpOutcome {
                user: Some(user.into()),
                session: None,
            }),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, ProviderError> {
        let raw: GoTrueSession = self
            .post_json(
                "/token?grant_type=password",
                &serde_json::json!({ "email": email, "password": password }),
            )
            .await?;

        let session = raw.into_session(Utc::now());
        *self.session.write().await = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        // Local session goes away even if the revoke call fails.
        let previous = self.session.write().await.take();
        self.emit(AuthEvent::SignedOut);

        let Some(session) = previous else {
            return Ok(());
        };

        let response = self
            .http
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }
        Ok(())
    }

    async fn resend_verification(&self, email: &str) -> Result<(), ProviderError> {
        let _: serde_json::Value = self
            .post_json(
                "/resend",
                &serde_json::json!({ "type": "signup", "email": email }),
            )
            .await?;
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, ProviderError> {
        let response = self
            .http
            .get(format!("{}/user", self.auth_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        let user: GoTrueUser = Self::check_response_json(response).await?;
        Ok(user.into())
    }
}
