//! Subscription service for plan, status and limit changes

use serde_json::json;
use tracing::info;

use crate::db::{DbPool, SubscriptionRepository};
use crate::models::{
    BillingPeriod, Subscription, SubscriptionFilter, SubscriptionStatus,
    UpgradeSubscriptionRequest,
};
use crate::services::audit::{events, record_event};
use crate::utils::AppError;

const NOT_FOUND: &str = "Subscription not found for this workspace";

#[derive(Clone)]
pub struct SubscriptionService {
    db: DbPool,
}

impl SubscriptionService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn get_for_workspace(&self, workspace_id: &str) -> Result<Subscription, AppError> {
        SubscriptionRepository::new(&self.db)
            .get_by_workspace(workspace_id)
            .await?
            .ok_or_else(|| AppError::not_found(NOT_FOUND))
    }

    pub async fn list(&self, filter: &SubscriptionFilter) -> Result<Vec<Subscription>, AppError> {
        Ok(SubscriptionRepository::new(&self.db).list(filter).await?)
    }

    pub async fn upgrade(
        &self,
        workspace_id: &str,
        actor_id: &str,
        req: &UpgradeSubscriptionRequest,
    ) -> Result<Subscription, AppError> {
        if req.seats < 1 {
            return Err(AppError::bad_request("Seats must be at least 1"));
        }

        let sub = SubscriptionRepository::new(&self.db)
            .upgrade(workspace_id, req)
            .await?
            .ok_or_else(|| AppError::not_found(NOT_FOUND))?;

        info!(workspace_id = %workspace_id, plan = %req.plan, "Subscription upgraded");
        self.audit(
            actor_id,
            workspace_id,
            json!({
                "plan": req.plan,
                "billing_period": req.billing_period,
                "seats": req.seats,
            }),
        )
        .await;
        Ok(sub)
    }

    pub async fn set_status(
        &self,
        workspace_id: &str,
        actor_id: &str,
        status: SubscriptionStatus,
    ) -> Result<Subscription, AppError> {
        let sub = SubscriptionRepository::new(&self.db)
            .set_status(workspace_id, status)
            .await?
            .ok_or_else(|| AppError::not_found(NOT_FOUND))?;

        self.audit(actor_id, workspace_id, json!({ "status": status })).await;
        Ok(sub)
    }

    pub async fn set_record_limit(
        &self,
        workspace_id: &str,
        actor_id: &str,
        new_limit: i64,
    ) -> Result<Subscription, AppError> {
        if new_limit < 0 {
            return Err(AppError::bad_request("Record limit cannot be negative"));
        }

        let sub = SubscriptionRepository::new(&self.db)
            .set_record_limit(workspace_id, new_limit)
            .await?
            .ok_or_else(|| AppError::not_found(NOT_FOUND))?;

        self.audit(actor_id, workspace_id, json!({ "record_limit": new_limit }))
            .await;
        Ok(sub)
    }

    /// Accepts `monthly`, `annual` and `yearly`
    pub async fn set_billing_period(
        &self,
        workspace_id: &str,
        actor_id: &str,
        billing_period: &str,
    ) -> Result<Subscription, AppError> {
        let period: BillingPeriod = billing_period.trim().parse().map_err(AppError::BadRequest)?;

        let sub = SubscriptionRepository::new(&self.db)
            .set_billing_period(workspace_id, period)
            .await?
            .ok_or_else(|| AppError::not_found(NOT_FOUND))?;

        self.audit(actor_id, workspace_id, json!({ "billing_period": period }))
            .await;
        Ok(sub)
    }

    async fn audit(&self, actor_id: &str, workspace_id: &str, details: serde_json::Value) {
        record_event(
            &self.db,
            events::SUBSCRIPTION_UPDATED,
            Some(actor_id),
            Some(workspace_id),
            details,
        )
        .await;
    }
}
