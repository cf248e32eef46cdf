// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager: who is signed in, and their profile.
//!
//! The manager is the only writer of [`AuthState`]. Consumers read it through
//! a `watch` receiver. Identity-provider events and explicit operations both
//! funnel into the same commit path, which writes user and profile together
//! in a single state update.
//!
//! Ordering: every session population takes a revision number before it
//! starts. A population is superseded only by a newer population for a
//! different identity or by a sign-out, so a slow initial fetch cannot
//! overwrite a later event while two populations of the same user both
//! land. A profile write also takes a revision; populations that began
//! before it keep their user but not the profile row they read.

use crate::config::Config;
use crate::db::ProfileStore;
use crate::error::{AppError, ProviderErrorKind, Result};
use crate::models::{AuthEvent, AuthSession, AuthUser, NewProfile, Profile, ProfileUpdate};
use crate::services::identity::IdentityProvider;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use validator::Validate;

/// Snapshot of the authentication state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    pub email_verified: bool,
    /// True until initialization finishes (or the safety window elapses)
    pub loading: bool,
    pub initialized: bool,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_pro_member(&self) -> bool {
        self.profile.as_ref().is_some_and(Profile::is_pro_member)
    }

    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().is_some_and(|p| p.is_admin)
    }
}

/// Session manager settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on `initialize()`
    pub init_timeout: Duration,
    /// Bearer used for profile writes when no session exists yet (the anon key)
    pub anon_token: String,
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            init_timeout: config.auth_init_timeout,
            anon_token: config.supabase_anon_key.clone(),
        }
    }
}

#[derive(Validate)]
struct SignUpForm {
    #[validate(email(message = "Please enter a valid email address"))]
    email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    password: String,
}

/// Revision bookkeeping for the commit path.
#[derive(Debug, Default)]
struct Gate {
    latest: u64,
    /// Populations older than this belong to a replaced identity.
    identity_barrier: u64,
    /// Populations older than this read the profile before a write.
    profile_barrier: u64,
    owner: Option<String>,
}

/// How a population's commit relates to later activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
    Current,
    ProfileStale,
    Superseded,
}

impl Gate {
    fn next(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    /// Bind revision `rev` to `user_id`. Returns false if it is already
    /// superseded.
    fn claim(&mut self, rev: u64, user_id: &str) -> bool {
        if rev < self.identity_barrier {
            return false;
        }
        if self.owner.as_deref() != Some(user_id) {
            self.identity_barrier = rev;
            self.owner = Some(user_id.to_string());
        }
        true
    }

    fn release(&mut self) -> u64 {
        let rev = self.next();
        self.identity_barrier = rev;
        self.owner = None;
        rev
    }

    fn mark_profile_write(&mut self) {
        self.profile_barrier = self.next();
    }

    fn freshness(&self, rev: u64) -> Freshness {
        if rev < self.identity_barrier {
            Freshness::Superseded
        } else if rev < self.profile_barrier {
            Freshness::ProfileStale
        } else {
            Freshness::Current
        }
    }
}

/// Outcome of a profile lookup.
enum Resolution {
    Found(Profile),
    /// Lookup failed; the profile is left as it was.
    Unavailable,
    /// The credential was rejected and the session was torn down.
    SignedOut,
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    config: SessionConfig,
    state: watch::Sender<AuthState>,
    gate: std::sync::Mutex<Gate>,
    /// Serializes profile resolution and profile writes.
    resolve_lock: Mutex<()>,
    shutdown: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Authentication context. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        config: SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(AuthState {
            loading: true,
            ..AuthState::default()
        });

        Self {
            inner: Arc::new(Inner {
                identity,
                profiles,
                config,
                state,
                gate: std::sync::Mutex::new(Gate::default()),
                resolve_lock: Mutex::new(()),
                shutdown: CancellationToken::new(),
                listener: Mutex::new(None),
            }),
        }
    }

    // ─── Read side ───────────────────────────────────────────────────────────

    /// Receiver that observes every committed state.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner.state.borrow().user.clone()
    }

    pub fn current_profile(&self) -> Option<Profile> {
        self.inner.state.borrow().profile.clone()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Register the session-change listener and load the current session.
    ///
    /// Always finishes within the configured safety window. On failure or
    /// timeout the state is left unauthenticated but marked initialized.
    pub async fn initialize(&self) {
        {
            let mut listener = self.inner.listener.lock().await;
            if listener.is_some() || self.inner.shutdown.is_cancelled() {
                return;
            }
            // Subscribe before fetching so no event between the two is lost.
            let events = self.inner.identity.subscribe();
            *listener = Some(self.spawn_listener(events));
        }

        tracing::info!("Initializing authentication");
        let rev = self.begin_revision();
        let timeout = self.inner.config.init_timeout;

        match tokio::time::timeout(timeout, self.load_initial_session(rev)).await {
            Ok(()) => {}
            Err(_) => tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Safety timeout reached, completing auth initialization"
            ),
        }

        self.mark_initialized();
    }

    /// Stop reacting to provider events.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        if let Some(handle) = self.inner.listener.lock().await.take() {
            handle.abort();
        }
        tracing::debug!("Session manager shut down");
    }

    async fn load_initial_session(&self, rev: u64) {
        match self.inner.identity.get_session().await {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user.id, "Found existing session");
                self.apply_session(&session, rev).await;
            }
            Ok(None) => tracing::info!("No existing session found"),
            Err(e) => tracing::error!(error = %e, "Error getting session"),
        }
    }

    fn spawn_listener(&self, mut events: broadcast::Receiver<AuthEvent>) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    received = events.recv() => received,
                };

                let Some(inner) = weak.upgrade() else { break };
                let manager = SessionManager { inner };

                match received {
                    Ok(event) => manager.handle_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth listener lagged, re-reading session");
                        manager.resync().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn handle_event(&self, event: AuthEvent) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        tracing::info!(event = event.name(), "Auth state changed");

        match event.session() {
            Some(session) => {
                let rev = self.begin_revision();
                self.apply_session(session, rev).await;
            }
            None => self.clear_session(),
        }
        self.mark_initialized();
    }

    async fn resync(&self) {
        let rev = self.begin_revision();
        match self.inner.identity.get_session().await {
            Ok(Some(session)) => self.apply_session(&session, rev).await,
            Ok(None) => self.clear_session(),
            Err(e) => tracing::error!(error = %e, "Failed to re-read session"),
        }
    }

    // ─── Commit path ─────────────────────────────────────────────────────────

    fn lock_gate(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.inner.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin_revision(&self) -> u64 {
        self.lock_gate().next()
    }

    /// Apply `f` unless the population at `rev` has been superseded. `f` is
    /// told whether the profile it carries is still fresh.
    fn commit(&self, rev: u64, f: impl FnOnce(&mut AuthState, bool)) -> bool {
        if self.inner.shutdown.is_cancelled() {
            return false;
        }
        self.inner.state.send_if_modified(|state| {
            let freshness = self.lock_gate().freshness(rev);
            match freshness {
                Freshness::Superseded => {
                    tracing::debug!(rev, "Discarding stale session population");
                    false
                }
                Freshness::ProfileStale => {
                    tracing::debug!(rev, "Profile changed during population, keeping newer row");
                    f(state, false);
                    true
                }
                Freshness::Current => {
                    f(state, true);
                    true
                }
            }
        })
    }

    async fn apply_session(&self, session: &AuthSession, rev: u64) {
        let user = session.user.clone();
        if !self.lock_gate().claim(rev, &user.id) {
            tracing::debug!(rev, user_id = %user.id, "Session population superseded");
            return;
        }

        let resolution = self
            .resolve(&session.access_token, &user.id, &user.email)
            .await;

        let found = match resolution {
            Resolution::Found(profile) => Some(profile),
            Resolution::Unavailable => None,
            Resolution::SignedOut => return,
        };

        self.commit(rev, |state, profile_fresh| {
            let keeps_own_row = state.profile.as_ref().is_some_and(|p| p.id == user.id);
            match found {
                Some(profile) if profile_fresh || !keeps_own_row => {
                    state.profile = Some(profile);
                }
                _ if !keeps_own_row => state.profile = None,
                _ => {}
            }
            state.email_verified = user.email_verified();
            state.user = Some(user);
        });
    }

    fn clear_session(&self) {
        let rev = self.lock_gate().release();
        self.commit(rev, |state, _| {
            state.user = None;
            state.profile = None;
            state.email_verified = false;
        });
    }

    fn mark_initialized(&self) {
        self.inner.state.send_if_modified(|state| {
            if state.initialized && !state.loading {
                return false;
            }
            state.loading = false;
            state.initialized = true;
            true
        });
    }

    // ─── Profile resolution ──────────────────────────────────────────────────

    /// Find the profile for an identity, creating the default row if none
    /// exists. Returns `None` when the profile could not be resolved.
    ///
    /// An expired credential signs the user out.
    pub async fn resolve_profile(
        &self,
        access_token: &str,
        user_id: &str,
        email: &str,
    ) -> Option<Profile> {
        match self.resolve(access_token, user_id, email).await {
            Resolution::Found(profile) => Some(profile),
            Resolution::Unavailable | Resolution::SignedOut => None,
        }
    }

    async fn resolve(&self, token: &str, user_id: &str, email: &str) -> Resolution {
        let _guard = self.inner.resolve_lock.lock().await;
        let profiles = &self.inner.profiles;

        tracing::debug!(user_id, "Fetching profile");
        let rows = match profiles.find_by_id(token, user_id).await {
            Ok(rows) => rows,
            Err(e) if e.kind() == ProviderErrorKind::ExpiredCredential => {
                tracing::info!(user_id, "JWT expired, signing out user");
                self.force_sign_out().await;
                return Resolution::SignedOut;
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Error fetching profile");
                return Resolution::Unavailable;
            }
        };

        if let Some(first) = rows.into_iter().next() {
            return Resolution::Found(first);
        }

        tracing::info!(user_id, "Profile not found, creating default profile");
        match profiles.insert(token, &NewProfile::new(user_id, email)).await {
            Ok(profile) => {
                tracing::info!(user_id, "Profile created");
                Resolution::Found(profile)
            }
            Err(e) if e.kind() == ProviderErrorKind::Conflict => {
                // Someone else created it between our read and write.
                match profiles.find_by_id(token, user_id).await {
                    Ok(rows) => rows
                        .into_iter()
                        .next()
                        .map_or(Resolution::Unavailable, Resolution::Found),
                    Err(e) => {
                        tracing::error!(user_id, error = %e, "Error re-reading profile");
                        Resolution::Unavailable
                    }
                }
            }
            Err(e) if e.kind() == ProviderErrorKind::ExpiredCredential => {
                self.force_sign_out().await;
                Resolution::SignedOut
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Error creating profile");
                Resolution::Unavailable
            }
        }
    }

    // ─── Operations ──────────────────────────────────────────────────────────

    /// Create an account and its profile.
    ///
    /// A failed profile insert is logged but does not fail the sign-up: the
    /// account exists and the profile is created on first sign-in.
    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<AuthUser> {
        let form = SignUpForm {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        form.validate().map_err(|e| AppError::BadRequest(e.to_string()))?;

        tracing::info!(email = %form.email, "Attempting to sign up user");
        let outcome = self
            .inner
            .identity
            .sign_up(&form.email, password, full_name)
            .await
            .map_err(|e| match e.kind() {
                ProviderErrorKind::AlreadyRegistered => AppError::AlreadyRegistered,
                _ => e.into_app_error(),
            })?;

        let user = outcome
            .user
            .or_else(|| outcome.session.as_ref().map(|s| s.user.clone()))
            .ok_or_else(|| AppError::Provider("Failed to create account".to_string()))?;

        let token = outcome
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.inner.config.anon_token.clone());

        self.create_signup_profile(&token, &user, full_name).await;

        if let Some(session) = outcome.session {
            let rev = self.begin_revision();
            self.apply_session(&session, rev).await;
        }

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    async fn create_signup_profile(&self, token: &str, user: &AuthUser, full_name: &str) {
        let _guard = self.inner.resolve_lock.lock().await;
        let profiles = &self.inner.profiles;
        let row = NewProfile::new(&user.id, &user.email).with_full_name(full_name);

        match profiles.insert(token, &row).await {
            Ok(_) => tracing::info!(user_id = %user.id, "Profile created with name"),
            Err(e) if e.kind() == ProviderErrorKind::Conflict => {
                // The listener created a default row first; carry the name over.
                let update = ProfileUpdate {
                    full_name: Some(full_name.to_string()),
                    ..ProfileUpdate::default()
                };
                match profiles.update(token, &user.id, &update).await {
                    Ok(profile) => self.adopt_written_profile(&user.id, profile),
                    Err(e) => tracing::error!(error = %e, "Error setting profile name"),
                }
            }
            Err(e) => tracing::error!(error = %e, "Error creating profile"),
        }
    }

    /// Password sign-in. Known failures map to distinct errors.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        tracing::info!(email, "Attempting to sign in user");
        let session = self
            .inner
            .identity
            .sign_in(email.trim(), password)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Sign-in failed");
                AppError::from(e)
            })?;

        let rev = self.begin_revision();
        self.apply_session(&session, rev).await;

        tracing::info!(user_id = %session.user.id, "User signed in");
        Ok(session.user)
    }

    /// Sign out. Local state is cleared even when the provider call fails;
    /// that failure is still reported.
    pub async fn sign_out(&self) -> Result<()> {
        tracing::info!("Signing out user");
        let result = self.inner.identity.sign_out().await;
        self.clear_session();

        result.map_err(|e| {
            tracing::error!(error = %e, "Sign-out error");
            e.into_app_error()
        })
    }

    async fn force_sign_out(&self) {
        if let Err(e) = self.inner.identity.sign_out().await {
            tracing::warn!(error = %e, "Provider sign-out failed during forced sign-out");
        }
        self.clear_session();
    }

    /// Apply a partial profile update and adopt the returned row.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        let (user, current) = {
            let state = self.inner.state.borrow();
            match (&state.user, &state.profile) {
                (Some(user), Some(profile)) => (user.clone(), profile.clone()),
                _ => return Err(AppError::NotSignedIn),
            }
        };

        if update.is_empty() {
            return Ok(current);
        }

        let token = self.access_token().await?;

        tracing::info!(user_id = %user.id, "Updating profile");
        let guard = self.inner.resolve_lock.lock().await;
        match self.inner.profiles.update(&token, &user.id, &update).await {
            Ok(profile) => {
                self.adopt_written_profile(&user.id, profile.clone());
                tracing::info!(user_id = %user.id, "Profile updated");
                Ok(profile)
            }
            Err(e) if e.kind() == ProviderErrorKind::ExpiredCredential => {
                drop(guard);
                tracing::info!("JWT expired during profile update, signing out user");
                self.force_sign_out().await;
                Err(AppError::SessionExpired)
            }
            Err(e) => {
                tracing::error!(error = %e, "Update profile error");
                Err(e.into_app_error())
            }
        }
    }

    /// Ask the provider to send the signup confirmation email again.
    pub async fn resend_verification_email(&self) -> Result<()> {
        let user = self.current_user().ok_or(AppError::NotSignedIn)?;
        if user.email.trim().is_empty() {
            return Err(AppError::MissingEmail);
        }

        tracing::info!(email = %user.email, "Resending verification email");
        self.inner
            .identity
            .resend_verification(&user.email)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Error resending verification email");
                e.into_app_error()
            })
    }

    /// Access token of the live session.
    async fn access_token(&self) -> Result<String> {
        match self.inner.identity.get_session().await {
            Ok(Some(session)) => Ok(session.access_token),
            Ok(None) => {
                self.clear_session();
                Err(AppError::SessionExpired)
            }
            Err(e) if e.kind() == ProviderErrorKind::ExpiredCredential => {
                self.force_sign_out().await;
                Err(AppError::SessionExpired)
            }
            Err(e) => Err(e.into_app_error()),
        }
    }

    /// Adopt a row this manager just wrote. Callers hold `resolve_lock`, so
    /// every population that read the row earlier loses its profile.
    fn adopt_written_profile(&self, user_id: &str, profile: Profile) {
        self.lock_gate().mark_profile_write();
        self.inner.state.send_if_modified(|state| {
            if state.user.as_ref().is_some_and(|u| u.id == user_id) {
                state.profile = Some(profile);
                true
            } else {
                false
            }
        });
    }
}
