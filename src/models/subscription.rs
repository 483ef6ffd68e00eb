//! Subscription model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Known subscription plans.
///
/// The `plan` column itself is free-form text, so readers must check stored
/// values against this list before trusting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Free,
    Plus,
    Pro,
    Enterprise,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Free => "free",
            SubscriptionPlan::Plus => "plus",
            SubscriptionPlan::Pro => "pro",
            SubscriptionPlan::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionPlan {
    type Err = String;

    /// Exact match only; stored plans are lowercase.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SubscriptionPlan::Free),
            "plus" => Ok(SubscriptionPlan::Plus),
            "pro" => Ok(SubscriptionPlan::Pro),
            "enterprise" => Ok(SubscriptionPlan::Enterprise),
            _ => Err(format!("Invalid subscription plan: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Annual,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Annual => "annual",
        }
    }

    /// Length of one billing period in days
    pub fn period_days(&self) -> i64 {
        match self {
            BillingPeriod::Monthly => 30,
            BillingPeriod::Annual => 365,
        }
    }
}

impl std::str::FromStr for BillingPeriod {
    type Err = String;

    /// `yearly` is accepted as a synonym for `annual`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" => Ok(BillingPeriod::Monthly),
            "annual" | "yearly" => Ok(BillingPeriod::Annual),
            _ => Err(format!("Invalid billing period: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "cancelled" | "canceled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

/// One subscription per workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub workspace_id: String,
    /// Raw stored plan; see [`Subscription::known_plan`]
    pub plan: String,
    pub billing_period: BillingPeriod,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    pub seats: i64,
    pub record_limit: Option<i64>,
    pub stripe_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// The stored plan if it is one of the known plans
    pub fn known_plan(&self) -> Option<SubscriptionPlan> {
        self.plan.parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeSubscriptionRequest {
    pub plan: SubscriptionPlan,
    #[serde(alias = "billing_period")]
    pub billing_period: BillingPeriod,
    #[serde(default = "default_seats")]
    pub seats: i64,
    #[serde(alias = "stripe_id")]
    pub stripe_id: Option<String>,
    #[serde(alias = "trial_end")]
    pub trial_end: Option<DateTime<Utc>>,
}

fn default_seats() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetSubscriptionStatusRequest {
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordLimitRequest {
    #[serde(alias = "new_limit")]
    pub new_limit: i64,
}

/// Billing period as free text so `yearly` can be normalised
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBillingRequest {
    #[serde(alias = "billingPeriod")]
    pub billing_period: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionFilter {
    pub plan: Option<String>,
    pub status: Option<String>,
}
