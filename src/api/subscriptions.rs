//! Subscription API endpoints

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};

use crate::{
    middleware::{Guard, RequestContext},
    models::{
        SetSubscriptionStatusRequest, Subscription, SubscriptionFilter, UpdateBillingRequest,
        UpdateRecordLimitRequest, UpgradeSubscriptionRequest,
    },
    require_guard,
    services::SubscriptionService,
    utils::AppError,
    AppState,
};

pub fn routes(state: &AppState) -> Router<AppState> {
    let member = Router::new()
        .route("/workspace/{workspaceId}", get(get_workspace_subscription))
        .route_layer(require_guard!(state, Guard::WorkspaceMember));

    let admin = Router::new()
        .route("/all", get(list_subscriptions))
        .route("/workspace/{workspaceId}/upgrade", patch(upgrade_subscription))
        .route("/workspace/{workspaceId}/status", patch(set_subscription_status))
        .route("/workspace/{workspaceId}/record-limit", patch(set_record_limit))
        .route("/workspace/{workspaceId}/billing", patch(set_billing_period))
        .route_layer(require_guard!(state, Guard::AdminOnly));

    member.merge(admin)
}

/// The guard only lets an active subscription through
async fn get_workspace_subscription(ctx: RequestContext) -> Result<Json<Subscription>, AppError> {
    ctx.subscription
        .map(Json)
        .ok_or_else(|| AppError::not_found("Subscription not found for this workspace"))
}

async fn list_subscriptions(
    State(state): State<AppState>,
    Query(filter): Query<SubscriptionFilter>,
) -> Result<Json<Vec<Subscription>>, AppError> {
    Ok(Json(SubscriptionService::new(state.db).list(&filter).await?))
}

async fn upgrade_subscription(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(workspace_id): Path<String>,
    Json(payload): Json<UpgradeSubscriptionRequest>,
) -> Result<Json<Subscription>, AppError> {
    let sub = SubscriptionService::new(state.db)
        .upgrade(&workspace_id, ctx.user_id(), &payload)
        .await?;
    Ok(Json(sub))
}

async fn set_subscription_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(workspace_id): Path<String>,
    Json(payload): Json<SetSubscriptionStatusRequest>,
) -> Result<Json<Subscription>, AppError> {
    let sub = SubscriptionService::new(state.db)
        .set_status(&workspace_id, ctx.user_id(), payload.status)
        .await?;
    Ok(Json(sub))
}

async fn set_record_limit(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(workspace_id): Path<String>,
    Json(payload): Json<UpdateRecordLimitRequest>,
) -> Result<Json<Subscription>, AppError> {
    let sub = SubscriptionService::new(state.db)
        .set_record_limit(&workspace_id, ctx.user_id(), payload.new_limit)
        .await?;
    Ok(Json(sub))
}

async fn set_billing_period(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(workspace_id): Path<String>,
    Json(payload): Json<UpdateBillingRequest>,
) -> Result<Json<Subscription>, AppError> {
    let sub = SubscriptionService::new(state.db)
        .set_billing_period(&workspace_id, ctx.user_id(), &payload.billing_period)
        .await?;
    Ok(Json(sub))
}
