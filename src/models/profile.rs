//! Profile model for the `profiles` table.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Subscription plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Studio,
}

/// Subscription lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Canceled,
    #[default]
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// Length of one billing period.
    pub fn period(self) -> Duration {
        match self {
            BillingCycle::Monthly => Duration::days(30),
            BillingCycle::Yearly => Duration::days(365),
        }
    }
}

/// Last known reachability of a third-party API for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConnection {
    pub connected: bool,
    pub last_checked: DateTime<Utc>,
}

/// Application profile, one per identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub niche: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub social_links: HashMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub follower_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_pro: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_admin: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subscription_tier: SubscriptionTier,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subscription_status: SubscriptionStatus,
    #[serde(default)]
    pub billing_cycle: Option<BillingCycle>,
    #[serde(default)]
    pub subscription_start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subscription_end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_payment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_payment_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub api_connections: HashMap<String, ApiConnection>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub elevenlabs_api_connected: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn is_pro_member(&self) -> bool {
        self.is_pro
    }

    /// Apply a partial update in memory, as the store would.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut self.email, &update.email);
        set(&mut self.full_name, &update.full_name);
        set(&mut self.avatar_url, &update.avatar_url);
        set(&mut self.niche, &update.niche);
        set(&mut self.bio, &update.bio);
        set(&mut self.social_links, &update.social_links);
        set(&mut self.follower_count, &update.follower_count);
        set(&mut self.is_pro, &update.is_pro);
        set(&mut self.subscription_tier, &update.subscription_tier);
        set(&mut self.subscription_status, &update.subscription_status);
        set(&mut self.billing_cycle, &update.billing_cycle);
        set(
            &mut self.subscription_start_date,
            &update.subscription_start_date,
        );
        set(&mut self.subscription_end_date, &update.subscription_end_date);
        set(&mut self.last_payment_date, &update.last_payment_date);
        set(&mut self.next_payment_date, &update.next_payment_date);
        set(&mut self.api_connections, &update.api_connections);
        set(
            &mut self.elevenlabs_api_connected,
            &update.elevenlabs_api_connected,
        );
    }
}

/// Treat an explicit JSON null like a missing column.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Row inserted when an identity has no profile yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProfile {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub niche: Option<String>,
    pub bio: Option<String>,
    pub social_links: HashMap<String, String>,
    pub follower_count: u64,
    pub is_pro: bool,
}

impl NewProfile {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            full_name: String::new(),
            avatar_url: None,
            niche: None,
            bio: None,
            social_links: HashMap::new(),
            follower_count: 0,
            is_pro: false,
        }
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    /// The full row as the store returns it after insert.
    pub fn into_profile(self, now: DateTime<Utc>) -> Profile {
        Profile {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            avatar_url: self.avatar_url,
            niche: self.niche,
            bio: self.bio,
            social_links: self.social_links,
            follower_count: self.follower_count,
            is_pro: self.is_pro,
            is_admin: false,
            subscription_tier: SubscriptionTier::Free,
            subscription_status: SubscriptionStatus::Free,
            billing_cycle: None,
            subscription_start_date: None,
            subscription_end_date: None,
            last_payment_date: None,
            next_payment_date: None,
            api_connections: HashMap::new(),
            elevenlabs_api_connected: false,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// Partial profile update.
///
/// `None` leaves a column untouched. Nullable columns use `Option<Option<T>>`
/// so that `Some(None)` writes an explicit null.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub niche: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_links: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follower_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pro: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<SubscriptionTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<SubscriptionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_cycle: Option<Option<BillingCycle>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_start_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_end_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_payment_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_payment_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_connections: Option<HashMap<String, ApiConnection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevenlabs_api_connected: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Start a paid plan (mock checkout: payment is recorded as taken `now`).
    pub fn activate_subscription(
        tier: SubscriptionTier,
        cycle: BillingCycle,
        now: DateTime<Utc>,
    ) -> Self {
        let period_end = now + cycle.period();
        Self {
            is_pro: Some(tier != SubscriptionTier::Free),
            subscription_tier: Some(tier),
            subscription_status: Some(SubscriptionStatus::Active),
            billing_cycle: Some(Some(cycle)),
            subscription_start_date: Some(Some(now)),
            subscription_end_date: Some(Some(period_end)),
            last_payment_date: Some(Some(now)),
            next_payment_date: Some(Some(period_end)),
            ..Self::default()
        }
    }

    /// Drop back to the free plan immediately.
    pub fn cancel_subscription() -> Self {
        Self {
            is_pro: Some(false),
            subscription_tier: Some(SubscriptionTier::Free),
            subscription_status: Some(SubscriptionStatus::Canceled),
            billing_cycle: Some(None),
            next_payment_date: Some(None),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_serializes_only_set_columns() {
        let update = ProfileUpdate {
            niche: Some(Some("Tech".to_string())),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "niche": "Tech" }));
    }

    #[test]
    fn test_cancel_writes_explicit_nulls() {
        let json = serde_json::to_value(ProfileUpdate::cancel_subscription()).unwrap();
        assert_eq!(json["billing_cycle"], serde_json::Value::Null);
        assert_eq!(json["next_payment_date"], serde_json::Value::Null);
        assert_eq!(json["subscription_tier"], "free");
        assert_eq!(json["subscription_status"], "canceled");
        assert!(json.get("subscription_start_date").is_none());
    }

    #[test]
    fn test_activate_yearly_plan() {
        let now = Utc::now();
        let mut profile = NewProfile::new("u1", "a@b.c").into_profile(now);
        profile.apply(&ProfileUpdate::activate_subscription(
            SubscriptionTier::Studio,
            BillingCycle::Yearly,
            now,
        ));

        assert!(profile.is_pro_member());
        assert_eq!(profile.subscription_tier, SubscriptionTier::Studio);
        assert_eq!(profile.subscription_status, SubscriptionStatus::Active);
        assert_eq!(profile.next_payment_date, Some(now + Duration::days(365)));
    }

    #[test]
    fn test_profile_defaults_when_columns_missing() {
        let profile: Profile =
            serde_json::from_value(serde_json::json!({ "id": "u1", "email": "a@b.c" })).unwrap();
        assert_eq!(profile.subscription_tier, SubscriptionTier::Free);
        assert_eq!(profile.subscription_status, SubscriptionStatus::Free);
        assert_eq!(profile.follower_count, 0);
        assert!(profile.social_links.is_empty());
        assert!(!profile.is_pro);
    }

    #[test]
    fn test_null_columns_read_as_defaults() {
        let profile: Profile = serde_json::from_value(serde_json::json!({
            "id": "u1",
            "email": "a@b.c",
            "full_name": null,
            "social_links": null,
            "follower_count": null
        }))
        .unwrap();
        assert_eq!(profile.full_name, "");
        assert!(profile.social_links.is_empty());
    }
}
