// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic and provider clients.

pub mod api_status;
pub mod identity;
pub mod session;
pub mod text;
pub mod video;
pub mod video_job;
pub mod voice;

pub use api_status::{ApiStatusReporter, ApiStatusService};
pub use identity::{IdentityProvider, SupabaseAuthClient};
pub use session::{AuthState, SessionConfig, SessionManager};
pub use text::{GeminiClient, TextGenerator};
pub use video::{TavusClient, VideoGenerator, VideoOptions};
pub use video_job::{evaluate_poll, PollConfig, PollOutcome, VideoJobRunner, VideoStudio};
pub use voice::{ElevenLabsClient, VoiceSynthesizer};
