use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown subscription status `{other}`")),
        }
    }
}

/// Externally owned subscription row in the crm store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: UserId,
    pub status: SubscriptionStatus,
    pub tier: String,
    pub monthly_quota: u32,
}

/// Structured summary returned for subscription status queries. Usage is
/// derived from reservations created since the start of the current month.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub status: SubscriptionStatus,
    pub tier: String,
    pub monthly_quota: u32,
    pub used_this_month: u32,
    pub remaining_quota: u32,
}

impl SubscriptionSummary {
    pub fn derive(subscription: &Subscription, used_this_month: u32) -> Self {
        Self {
            status: subscription.status,
            tier: subscription.tier.clone(),
            monthly_quota: subscription.monthly_quota,
            used_this_month,
            remaining_quota: subscription.monthly_quota.saturating_sub(used_this_month),
        }
    }
}
