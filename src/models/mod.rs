// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod job;
pub mod profile;
pub mod session;

pub use job::{GenerationJob, JobPhase, ProviderJobStatus, VideoRequest, VideoStatusResponse};
pub use profile::{
    ApiConnection, BillingCycle, NewProfile, Profile, ProfileUpdate, SubscriptionStatus,
    SubscriptionTier,
};
pub use session::{AuthEvent, AuthSession, AuthUser, SignUpOutcome};
