// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PostgREST client for the `profiles` table.

use crate::db::{tables, ProfileStore};
use crate::error::ProviderError;
use crate::models::{NewProfile, Profile, ProfileUpdate};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Supabase REST client.
#[derive(Clone)]
pub struct PostgrestProfileStore {
    http: reqwest::Client,
    rest_url: String,
    api_key: String,
}

impl PostgrestProfileStore {
    /// Create a client for `{supabase_url}/rest/v1`.
    pub fn new(supabase_url: &str, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(ProviderError::transport)?;

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1", supabase_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.rest_url, tables::PROFILES)
    }

    fn id_filter(id: &str) -> String {
        format!("eq.{}", urlencoding::encode(id))
    }

    fn request(&self, method: reqwest::Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
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
                "PostgREST request failed"
            );
            return Err(err);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("JSON parse error: {}", e)))
    }

    /// `return=representation` yields an array; a write must touch exactly one row.
    fn single_row(rows: Vec<Profile>) -> Result<Profile, ProviderError> {
        let count = rows.len();
        match <[Profile; 1]>::try_from(rows) {
            Ok([row]) => Ok(row),
            Err(_) => Err(ProviderError::new(format!(
                "JSON object requested, multiple (or no) rows returned ({} rows)",
                count
            ))
            .with_code("PGRST116")),
        }
    }
}

#[async_trait]
impl ProfileStore for PostgrestProfileStore {
    async fn find_by_id(&self, token: &str, id: &str) -> Result<Vec<Profile>, ProviderError> {
        let url = format!(
            "{}?select=*&id={}&limit=1",
            self.table_url(),
            Self::id_filter(id)
        );

        let response = self
            .request(reqwest::Method::GET, &url, token)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        Self::check_response_json(response).await
    }

    async fn insert(&self, token: &str, profile: &NewProfile) -> Result<Profile, ProviderError> {
        let response = self
            .request(reqwest::Method::POST, &self.table_url(), token)
            .header("Prefer", "return=representation")
            .json(profile)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        let rows: Vec<Profile> = Self::check_response_json(response).await?;
        Self::single_row(rows)
    }

    async fn update(
        &self,
        token: &str,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, ProviderError> {
        let url = format!("{}?id={}", self.table_url(), Self::id_filter(id));

        let response = self
            .request(reqwest::Method::PATCH, &url, token)
            .header("Prefer", "return=representation")
            .json(update)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        let rows: Vec<Profile> = Self::check_response_json(response).await?;
        Self::single_row(rows)
    }
}
