//! Subscription repository

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use super::{format_timestamp, now_timestamp, parse_db_timestamp, parse_optional_timestamp};
use crate::models::{
    BillingPeriod, Subscription, SubscriptionFilter, SubscriptionPlan, SubscriptionStatus,
    UpgradeSubscriptionRequest,
};

const SUBSCRIPTION_COLUMNS: &str = "id, workspace_id, plan, billing_period, status, \
     current_period_start, current_period_end, trial_end, seats, record_limit, stripe_id, \
     created_at, updated_at";

/// Default subscription given to new workspaces
pub const DEFAULT_RECORD_LIMIT: i64 = 1000;
const DEFAULT_PERIOD_YEARS: i64 = 10;

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: String,
    workspace_id: String,
    plan: String,
    billing_period: String,
    status: String,
    current_period_start: String,
    current_period_end: String,
    trial_end: Option<String>,
    seats: i64,
    record_limit: Option<i64>,
    stripe_id: Option<String>,
    created_at: String,
    updated_at: String,
}

pub struct SubscriptionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SubscriptionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_workspace(&self, workspace_id: &str) -> Result<Option<Subscription>> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE workspace_id = ?",
            SUBSCRIPTION_COLUMNS
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(workspace_id)
            .fetch_optional(self.pool)
            .await
            .context("Failed to get subscription")?;

        Ok(row.map(row_to_subscription))
    }

    pub async fn list(&self, filter: &SubscriptionFilter) -> Result<Vec<Subscription>> {
        let mut sql = format!("SELECT {} FROM subscriptions WHERE 1 = 1", SUBSCRIPTION_COLUMNS);
        if filter.plan.is_some() {
            sql.push_str(" AND plan = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query_as::<_, SubscriptionRow>(&sql);
        if let Some(ref plan) = filter.plan {
            q = q.bind(plan);
        }
        if let Some(ref status) = filter.status {
            q = q.bind(status);
        }

        let rows = q
            .fetch_all(self.pool)
            .await
            .context("Failed to list subscriptions")?;

        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    /// Move to a new plan; the subscription becomes active with a fresh period
    pub async fn upgrade(
        &self,
        workspace_id: &str,
        req: &UpgradeSubscriptionRequest,
    ) -> Result<Option<Subscription>> {
        let start = Utc::now();
        let end = start + Duration::days(req.billing_period.period_days());

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET plan = ?, billing_period = ?, status = 'active', seats = ?,
                stripe_id = COALESCE(?, stripe_id), trial_end = ?,
                current_period_start = ?, current_period_end = ?, updated_at = ?
            WHERE workspace_id = ?
            "#,
        )
        .bind(req.plan.as_str())
        .bind(req.billing_period.as_str())
        .bind(req.seats)
        .bind(&req.stripe_id)
        .bind(req.trial_end.map(format_timestamp))
        .bind(format_timestamp(start))
        .bind(format_timestamp(end))
        .bind(now_timestamp())
        .bind(workspace_id)
        .execute(self.pool)
        .await
        .context("Failed to upgrade subscription")?;

        self.updated(result.rows_affected(), workspace_id).await
    }

    pub async fn set_status(
        &self,
        workspace_id: &str,
        status: SubscriptionStatus,
    ) -> Result<Option<Subscription>> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = ?, updated_at = ? WHERE workspace_id = ?",
        )
        .bind(status.as_str())
        .bind(now_timestamp())
        .bind(workspace_id)
        .execute(self.pool)
        .await
        .context("Failed to update subscription status")?;

        self.updated(result.rows_affected(), workspace_id).await
    }

    pub async fn set_record_limit(
        &self,
        workspace_id: &str,
        record_limit: i64,
    ) -> Result<Option<Subscription>> {
        let result = sqlx::query(
            "UPDATE subscriptions SET record_limit = ?, updated_at = ? WHERE workspace_id = ?",
        )
        .bind(record_limit)
        .bind(now_timestamp())
        .bind(workspace_id)
        .execute(self.pool)
        .await
        .context("Failed to update record limit")?;

        self.updated(result.rows_affected(), workspace_id).await
    }

    pub async fn set_billing_period(
        &self,
        workspace_id: &str,
        billing_period: BillingPeriod,
    ) -> Result<Option<Subscription>> {
        let result = sqlx::query(
            "UPDATE subscriptions SET billing_period = ?, updated_at = ? WHERE workspace_id = ?",
        )
        .bind(billing_period.as_str())
        .bind(now_timestamp())
        .bind(workspace_id)
        .execute(self.pool)
        .await
        .context("Failed to update billing period")?;

        self.updated(result.rows_affected(), workspace_id).await
    }

    async fn updated(&self, rows: u64, workspace_id: &str) -> Result<Option<Subscription>> {
        if rows == 0 {
            return Ok(None);
        }
        self.get_by_workspace(workspace_id).await
    }
}

/// Insert the default free subscription for a new workspace
pub async fn insert_default(conn: &mut SqliteConnection, workspace_id: &str) -> Result<()> {
    let start = Utc::now();
    let end = start + Duration::days(365 * DEFAULT_PERIOD_YEARS);
    let now = format_timestamp(start);

    sqlx::query(
        r#"
        INSERT INTO subscriptions (id, workspace_id, plan, billing_period, status,
            current_period_start, current_period_end, seats, record_limit, created_at, updated_at)
        VALUES (?, ?, ?, 'monthly', 'active', ?, ?, 1, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(workspace_id)
    .bind(SubscriptionPlan::Free.as_str())
    .bind(&now)
    .bind(format_timestamp(end))
    .bind(DEFAULT_RECORD_LIMIT)
    .bind(&now)
    .bind(&now)
    .execute(conn)
    .await
    .context("Failed to create default subscription")?;

    Ok(())
}

fn parse_or<T: std::str::FromStr>(value: &str, fallback: T, field: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        warn!(field = field, value = value, "Unrecognised subscription value in database");
        fallback
    })
}

fn row_to_subscription(row: SubscriptionRow) -> Subscription {
    Subscription {
        id: row.id,
        workspace_id: row.workspace_id,
        plan: row.plan,
        billing_period: parse_or(&row.billing_period, BillingPeriod::Monthly, "billing_period"),
        // Unknown statuses never authorize access
        status: parse_or(&row.status, SubscriptionStatus::Expired, "status"),
        current_period_start: parse_db_timestamp(&row.current_period_start),
        current_period_end: parse_db_timestamp(&row.current_period_end),
        trial_end: parse_optional_timestamp(row.trial_end.as_deref()),
        seats: row.seats,
        record_limit: row.record_limit,
        stripe_id: row.stripe_id,
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
