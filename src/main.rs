// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Creator Copilot API Server
//!
//! Serves the API status endpoint that provider clients report to.

use creator_copilot::{
    config::Config,
    db::PostgrestProfileStore,
    services::{ApiStatusService, SupabaseAuthClient},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Creator Copilot API");

    let service_key = config.require_service_role_key()?.to_string();

    // Tokens presented by callers are checked against the auth server
    let identity = Arc::new(SupabaseAuthClient::new(
        &config.supabase_url,
        config.supabase_anon_key.clone(),
    )?);

    // Profile writes use the service role and bypass row-level security
    let profiles = Arc::new(PostgrestProfileStore::new(
        &config.supabase_url,
        service_key.clone(),
    )?);
    let api_status = ApiStatusService::new(profiles, service_key);
    tracing::info!(supabase_url = %config.supabase_url, "Supabase clients initialized");

    let state = Arc::new(AppState {
        config: config.clone(),
        identity,
        api_status,
    });

    let app = creator_copilot::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,creator_copilot=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
