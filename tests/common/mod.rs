// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory providers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use creator_copilot::config::Config;
use creator_copilot::db::ProfileStore;
use creator_copilot::error::ProviderError;
use creator_copilot::models::{
    AuthEvent, AuthSession, AuthUser, NewProfile, Profile, ProfileUpdate, SignUpOutcome,
    VideoStatusResponse,
};
use creator_copilot::routes::create_router;
use creator_copilot::services::{
    ApiStatusService, IdentityProvider, SessionConfig, SessionManager, VideoGenerator,
    VideoOptions, VoiceSynthesizer,
};
use creator_copilot::AppState;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const ANON_KEY: &str = "anon-key";

pub fn test_user(id: &str) -> AuthUser {
    let now = Utc::now();
    AuthUser {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        created_at: now,
        updated_at: now,
        email_confirmed_at: Some(now),
    }
}

pub fn token_for(user_id: &str) -> String {
    format!("token-{}", user_id)
}

pub fn test_session(user_id: &str) -> AuthSession {
    AuthSession {
        access_token: token_for(user_id),
        refresh_token: format!("refresh-{}", user_id),
        expires_at: Utc::now() + ChronoDuration::hours(1),
        user: test_user(user_id),
    }
}

pub fn expired_jwt_error() -> ProviderError {
    ProviderError::new("JWT expired")
        .with_status(401)
        .with_code("PGRST301")
}

// ─── Identity provider ───────────────────────────────────────────────────────

/// Identity provider keeping one session in memory.
pub struct FakeIdentity {
    events: broadcast::Sender<AuthEvent>,
    session: Mutex<Option<AuthSession>>,
    /// Users known by access token, for `get_user`
    tokens: Mutex<HashMap<String, AuthUser>>,
    /// `get_session` never returns while set
    pub hang_get_session: AtomicBool,
    /// `sign_up` returns a session instead of a bare user
    pub autoconfirm: AtomicBool,
    pub sign_in_error: Mutex<Option<ProviderError>>,
    pub sign_up_error: Mutex<Option<ProviderError>>,
    pub sign_out_error: Mutex<Option<ProviderError>>,
    pub resend_error: Mutex<Option<ProviderError>>,
    pub sign_out_calls: AtomicUsize,
    pub resent_to: Mutex<Vec<String>>,
}

impl FakeIdentity {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            events,
            session: Mutex::new(None),
            tokens: Mutex::new(HashMap::new()),
            hang_get_session: AtomicBool::new(false),
            autoconfirm: AtomicBool::new(false),
            sign_in_error: Mutex::new(None),
            sign_up_error: Mutex::new(None),
            sign_out_error: Mutex::new(None),
            resend_error: Mutex::new(None),
            sign_out_calls: AtomicUsize::new(0),
            resent_to: Mutex::new(Vec::new()),
        }
    }

    /// Start with a stored session, as after a page reload.
    pub fn with_session(session: AuthSession) -> Self {
        let fake = Self::new();
        fake.register(&session.access_token, session.user.clone());
        *fake.session.lock().unwrap() = Some(session);
        fake
    }

    pub fn register(&self, token: &str, user: AuthUser) {
        self.tokens.lock().unwrap().insert(token.to_string(), user);
    }

    /// Replace the stored session and announce it.
    pub fn emit(&self, event: AuthEvent) {
        *self.session.lock().unwrap() = event.session().cloned();
        if let Some(session) = event.session() {
            self.register(&session.access_token, session.user.clone());
        }
        let _ = self.events.send(event);
    }

    pub fn stored_session(&self) -> Option<AuthSession> {
        self.session.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn get_session(&self) -> Result<Option<AuthSession>, ProviderError> {
        if self.hang_get_session.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self.stored_session())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        _full_name: &str,
    ) -> Result<SignUpOutcome, ProviderError> {
        if let Some(err) = self.sign_up_error.lock().unwrap().take() {
            return Err(err);
        }
        let id = email.split('@').next().unwrap_or(email);
        let mut user = test_user(id);
        user.email = email.to_string();

        if self.autoconfirm.load(Ordering::SeqCst) {
            let mut session = test_session(id);
            session.user = user.clone();
            self.emit(AuthEvent::SignedIn(session.clone()));
            Ok(SignUpOutcome {
                user: Some(user),
                session: Some(session),
            })
        } else {
            user.email_confirmed_at = None;
            Ok(SignUpOutcome {
                user: Some(user),
                session: None,
            })
        }
    }

    async fn sign_in(&self, email: &str, _password: &str) -> Result<AuthSession, ProviderError> {
        if let Some(err) = self.sign_in_error.lock().unwrap().take() {
            return Err(err);
        }
        let id = email.split('@').next().unwrap_or(email);
        let session = test_session(id);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.emit(AuthEvent::SignedOut);
        match self.sign_out_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn resend_verification(&self, email: &str) -> Result<(), ProviderError> {
        if let Some(err) = self.resend_error.lock().unwrap().take() {
            return Err(err);
        }
        self.resent_to.lock().unwrap().push(email.to_string());
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, ProviderError> {
        self.tokens
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or_else(|| ProviderError::new("invalid JWT").with_status(401).with_code("bad_jwt"))
    }
}

// ─── Profile store ───────────────────────────────────────────────────────────

/// `profiles` table in a map. Inserting an existing id is a unique violation.
#[derive(Default)]
pub struct FakeProfileStore {
    rows: Mutex<HashMap<String, Profile>>,
    pub inserts: AtomicUsize,
    pub finds: AtomicUsize,
    pub updates: AtomicUsize,
    /// Returned (once) by the next call of any kind
    pub next_error: Mutex<Option<ProviderError>>,
    /// Delay applied to every `find_by_id` before it reads
    pub find_delay: Mutex<Option<Duration>>,
    /// Delay applied to every `find_by_id` after it has read the row
    pub find_reply_delay: Mutex<Option<Duration>>,
    pub tokens_seen: Mutex<Vec<String>>,
}

impl FakeProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, profile: Profile) {
        self.rows.lock().unwrap().insert(profile.id.clone(), profile);
    }

    pub fn get(&self, id: &str) -> Option<Profile> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn fail_next(&self, err: ProviderError) {
        *self.next_error.lock().unwrap() = Some(err);
    }

    fn take_error(&self, token: &str) -> Result<(), ProviderError> {
        self.tokens_seen.lock().unwrap().push(token.to_string());
        match self.next_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProfileStore for FakeProfileStore {
    async fn find_by_id(&self, token: &str, id: &str) -> Result<Vec<Profile>, ProviderError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        let delay = *self.find_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.take_error(token)?;
        let rows: Vec<Profile> = self.get(id).into_iter().collect();
        let reply_delay = *self.find_reply_delay.lock().unwrap();
        if let Some(delay) = reply_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(rows)
    }

    async fn insert(&self, token: &str, profile: &NewProfile) -> Result<Profile, ProviderError> {
        self.take_error(token)?;
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&profile.id) {
            return Err(ProviderError::new(
                "duplicate key value violates unique constraint \"profiles_pkey\"",
            )
            .with_status(409)
            .with_code("23505"));
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let row = profile.clone().into_profile(Utc::now());
        rows.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        token: &str,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, ProviderError> {
        self.take_error(token)?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(id).ok_or_else(|| {
            ProviderError::new("JSON object requested, multiple (or no) rows returned")
                .with_status(406)
                .with_code("PGRST116")
        })?;
        row.apply(update);
        Ok(row.clone())
    }
}

// ─── Voice and video providers ───────────────────────────────────────────────

#[derive(Default)]
pub struct FakeVoice {
    pub fail_with: Mutex<Option<ProviderError>>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl VoiceSynthesizer for FakeVoice {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_with.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok("data:audio/mpeg;base64,SUQz".to_string()),
        }
    }
}

/// Video provider replaying scripted status responses. Once the script is
/// exhausted every poll reports `generating`.
#[derive(Default)]
pub struct ScriptedVideo {
    script: Mutex<VecDeque<serde_json::Value>>,
    pub submit_error: Mutex<Option<ProviderError>>,
    pub submits: AtomicUsize,
    pub polls: AtomicUsize,
    pub last_options: Mutex<Option<VideoOptions>>,
}

impl ScriptedVideo {
    pub fn new(script: Vec<serde_json::Value>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoGenerator for ScriptedVideo {
    async fn submit(
        &self,
        _script: &str,
        _avatar_id: &str,
        options: &VideoOptions,
    ) -> Result<String, ProviderError> {
        if let Some(err) = self.submit_error.lock().unwrap().take() {
            return Err(err);
        }
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_options.lock().unwrap() = Some(options.clone());
        Ok(format!("video-{}", n))
    }

    async fn status(&self, _job_id: &str) -> Result<VideoStatusResponse, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let raw = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| serde_json::json!({ "status": "generating" }));
        Ok(VideoStatusResponse::from_value(&raw))
    }
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

pub fn session_config() -> SessionConfig {
    SessionConfig {
        init_timeout: Duration::from_secs(10),
        anon_token: ANON_KEY.to_string(),
    }
}

pub fn session_manager(
    identity: &Arc<FakeIdentity>,
    profiles: &Arc<FakeProfileStore>,
) -> SessionManager {
    SessionManager::new(identity.clone(), profiles.clone(), session_config())
}

/// Wait until the manager's state satisfies `pred`.
pub async fn wait_for(
    manager: &SessionManager,
    pred: impl Fn(&creator_copilot::services::AuthState) -> bool,
) {
    let mut rx = manager.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for auth state")
        .expect("state channel closed");
}

/// Router over fakes. Returns the router plus the fakes behind it.
pub fn create_test_app() -> (axum::Router, Arc<FakeIdentity>, Arc<FakeProfileStore>) {
    let identity = Arc::new(FakeIdentity::new());
    let profiles = Arc::new(FakeProfileStore::new());

    let state = Arc::new(AppState {
        config: Config::test_default(),
        identity: identity.clone(),
        api_status: ApiStatusService::new(profiles.clone(), "service-role-key"),
    });

    (create_router(state), identity, profiles)
}
