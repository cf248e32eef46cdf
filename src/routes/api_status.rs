// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API connection status route (requires authentication).

use crate::error::{AppError, Result};
use crate::models::AuthUser;
use crate::services::api_status::{
    UpdateApiStatusRequest, UpdateApiStatusResponse, UPDATE_API_STATUS_PATH,
};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Extension, Json, Router,
};
use std::sync::Arc;

/// The auth middleware is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(UPDATE_API_STATUS_PATH, post(update_api_status))
}

/// Record whether a third-party API worked for the caller.
async fn update_api_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<UpdateApiStatusRequest>, JsonRejection>,
) -> Result<Json<UpdateApiStatusResponse>> {
    let Json(request) = body.map_err(|e| {
        tracing::debug!(error = %e, "Unparseable API status body");
        AppError::BadRequest("Missing required parameters".to_string())
    })?;

    let response = state
        .api_status
        .update(&user, request, chrono::Utc::now())
        .await?;
    Ok(Json(response))
}
