// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Creator Copilot: session and generation backend for AI content creators
//!
//! This crate provides the client-side session manager, the avatar video
//! job runner, provider clients (auth, profiles, text, voice, video) and
//! the API status service that records which third-party APIs work for a user.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::{ApiStatusService, IdentityProvider};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub identity: Arc<dyn IdentityProvider>,
    pub api_status: ApiStatusService,
}
