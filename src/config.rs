//! Application configuration loaded from environment variables.
//!
//! Provider API keys are read once at startup and passed to the adapters
//! that need them.

use std::env;
use std::time::Duration;

/// Default safety window for session initialization.
pub const DEFAULT_AUTH_INIT_TIMEOUT_SECS: u64 = 10;
/// Delay between two video status polls.
pub const DEFAULT_VIDEO_POLL_INTERVAL_SECS: u64 = 4;
/// Poll ceiling for one video job (300 polls at 4 s is about 20 minutes).
pub const DEFAULT_VIDEO_MAX_POLLS: u32 = 300;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Supabase ---
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub supabase_url: String,
    /// Public anon key sent as `apikey` on every request
    pub supabase_anon_key: String,
    /// Service role key, only needed by the API status endpoint
    pub supabase_service_role_key: Option<String>,

    // --- AI providers ---
    pub gemini_api_key: String,
    pub elevenlabs_api_key: String,
    pub tavus_api_key: String,

    // --- Server ---
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,

    // --- Timing ---
    pub auth_init_timeout: Duration,
    pub video_poll_interval: Duration,
    pub video_max_polls: u32,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            supabase_service_role_key: Some("test_service_role_key".to_string()),
            gemini_api_key: "test_gemini_key".to_string(),
            elevenlabs_api_key: "test_elevenlabs_key".to_string(),
            tavus_api_key: "test_tavus_key".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            auth_init_timeout: Duration::from_secs(DEFAULT_AUTH_INIT_TIMEOUT_SECS),
            video_poll_interval: Duration::from_secs(DEFAULT_VIDEO_POLL_INTERVAL_SECS),
            video_max_polls: DEFAULT_VIDEO_MAX_POLLS,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),

            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            elevenlabs_api_key: env::var("ELEVENLABS_API_KEY").unwrap_or_default(),
            tavus_api_key: env::var("TAVUS_API_KEY").unwrap_or_default(),

            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: parse_or("PORT", 8080)?,

            auth_init_timeout: Duration::from_secs(parse_or(
                "AUTH_INIT_TIMEOUT_SECS",
                DEFAULT_AUTH_INIT_TIMEOUT_SECS,
            )?),
            video_poll_interval: Duration::from_secs(parse_or(
                "VIDEO_POLL_INTERVAL_SECS",
                DEFAULT_VIDEO_POLL_INTERVAL_SECS,
            )?),
            video_max_polls: parse_or("VIDEO_MAX_POLLS", DEFAULT_VIDEO_MAX_POLLS)?,
        })
    }

    /// Service role key, required by server-side profile writes.
    pub fn require_service_role_key(&self) -> Result<&str, ConfigError> {
        self.supabase_service_role_key
            .as_deref()
            .ok_or(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("SUPABASE_URL", "https://example.supabase.co/");
        env::set_var("SUPABASE_ANON_KEY", " anon ");
        env::set_var("VIDEO_MAX_POLLS", "12");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.supabase_url, "https://example.supabase.co");
        assert_eq!(config.supabase_anon_key, "anon");
        assert_eq!(config.video_max_polls, 12);
        assert_eq!(config.video_poll_interval, Duration::from_secs(4));
        assert_eq!(config.auth_init_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_missing_service_role_key() {
        let mut config = Config::test_default();
        config.supabase_service_role_key = None;
        assert!(matches!(
            config.require_service_role_key(),
            Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))
        ));
    }
}
