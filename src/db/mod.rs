//! Database layer (Supabase PostgREST).

pub mod postgrest;

pub use postgrest::PostgrestProfileStore;

use crate::error::ProviderError;
use crate::models::{NewProfile, Profile, ProfileUpdate};
use async_trait::async_trait;

/// Table names as constants.
pub mod tables {
    pub const PROFILES: &str = "profiles";
}

/// Row access to the `profiles` table, keyed by identity id.
///
/// Every call carries the bearer token the request runs as: the signed-in
/// user's access token on the client, the service role key on the server.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Rows matching `id` (at most one is requested).
    async fn find_by_id(&self, token: &str, id: &str) -> Result<Vec<Profile>, ProviderError>;

    /// Insert a row and return it as stored.
    async fn insert(&self, token: &str, profile: &NewProfile) -> Result<Profile, ProviderError>;

    /// Apply a partial update and return the authoritative row.
    async fn update(
        &self,
        token: &str,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, ProviderError>;
}
