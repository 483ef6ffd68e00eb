//! Workspace API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::{
    middleware::{Guard, RequestContext},
    models::{
        CreateWorkspaceRequest, PendingInvite, SlugAvailability, UpdateWorkspaceRequest,
        UserWorkspace, Workspace,
    },
    require_guard,
    services::WorkspaceService,
    utils::AppError,
    AppState,
};

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/", get(list_workspaces).post(create_workspace))
        .route_layer(require_guard!(state, Guard::AdminOnly));

    let authenticated = Router::new()
        .route("/user", get(list_my_workspaces).post(create_my_workspace))
        .route("/invites", get(list_my_invites))
        .route("/slug-available/{slug}", get(slug_available))
        .route_layer(require_guard!(state, Guard::Authenticated));

    let member = Router::new()
        .route("/{workspaceId}", get(get_workspace))
        .route_layer(require_guard!(state, Guard::WorkspaceMember));

    let workspace_admin = Router::new()
        .route(
            "/{workspaceId}",
            axum::routing::patch(update_workspace).delete(delete_workspace),
        )
        .route_layer(require_guard!(state, Guard::WorkspaceAdmin));

    let guest_or_member = Router::new()
        .route("/{workspaceId}/trial-feature", get(trial_feature))
        .route_layer(require_guard!(state, Guard::GuestOrWorkspaceMember));

    admin
        .merge(authenticated)
        .merge(member)
        .merge(workspace_admin)
        .merge(guest_or_member)
}

async fn list_workspaces(State(state): State<AppState>) -> Result<Json<Vec<Workspace>>, AppError> {
    Ok(Json(WorkspaceService::new(state.db).list_all().await?))
}

/// Admin creation on behalf of another user
async fn create_workspace(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<Workspace>), AppError> {
    let owner_id = payload
        .owner_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("owner_id is required"))?;

    let workspace = WorkspaceService::new(state.db)
        .create(ctx.user_id(), &owner_id, &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

async fn create_my_workspace(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<Workspace>), AppError> {
    if let Some(owner_id) = payload.owner_id.as_deref() {
        if owner_id != ctx.user_id() {
            return Err(AppError::bad_request(
                "Cannot create a workspace owned by another user",
            ));
        }
    }

    let workspace = WorkspaceService::new(state.db)
        .create(ctx.user_id(), ctx.user_id(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

async fn list_my_workspaces(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<UserWorkspace>>, AppError> {
    Ok(Json(
        WorkspaceService::new(state.db)
            .list_for_user(ctx.user_id())
            .await?,
    ))
}

async fn list_my_invites(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<PendingInvite>>, AppError> {
    Ok(Json(
        WorkspaceService::new(state.db)
            .list_invites(ctx.user_id())
            .await?,
    ))
}

async fn slug_available(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<SlugAvailability>, AppError> {
    Ok(Json(
        WorkspaceService::new(state.db).slug_availability(&slug).await?,
    ))
}

/// The guard already loaded the workspace
async fn get_workspace(ctx: RequestContext) -> Result<Json<Workspace>, AppError> {
    ctx.workspace
        .map(Json)
        .ok_or_else(|| AppError::not_found("Workspace not found"))
}

async fn update_workspace(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<UpdateWorkspaceRequest>,
) -> Result<Json<Workspace>, AppError> {
    let workspace_id = ctx.require_workspace_id()?;
    let workspace = WorkspaceService::new(state.db)
        .update(workspace_id, ctx.user_id(), &payload)
        .await?;
    Ok(Json(workspace))
}

async fn delete_workspace(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<StatusCode, AppError> {
    let workspace_id = ctx.require_workspace_id()?;
    WorkspaceService::new(state.db)
        .delete(workspace_id, ctx.user_id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Describe how the caller reached the workspace. Guests spend one use of
/// their token.
async fn trial_feature(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Value>, AppError> {
    let subscription = ctx
        .subscription
        .as_ref()
        .ok_or_else(|| AppError::forbidden("Active subscription required"))?;

    if ctx.principal.is_guest() {
        let token = ctx
            .guest_token
            .as_deref()
            .ok_or_else(|| AppError::unauthorized("Guest token required"))?;

        let record = state.guest_tokens.validate(token, Some("guest")).await?;
        state.guest_tokens.increment_usage(token).await?;

        return Ok(Json(json!({
            "type": "guest",
            "guest_id": ctx.principal.id,
            "workspace_id": record.workspace_id,
            "subscription_id": subscription.id,
            "plan": subscription.plan,
            "subscription_status": subscription.status,
            "permissions": record.permissions,
            "usage_count": record.usage_count + 1,
        })));
    }

    Ok(Json(json!({
        "type": "user",
        "user_id": ctx.principal.id,
        "email": ctx.principal.email,
        "is_global_admin": ctx.principal.is_global_admin,
        "role": ctx.membership.as_ref().map(|m| m.role),
        "workspace_id": subscription.workspace_id,
        "subscription_id": subscription.id,
        "plan": subscription.plan,
        "subscription_status": subscription.status,
    })))
}
