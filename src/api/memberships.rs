//! Workspace membership API endpoints
//!
//! Nested under `/user-workspaces/{workspaceId}/members`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};

use crate::{
    middleware::{Guard, RequestContext},
    models::{InviteMemberRequest, Membership, UpdateMemberRoleRequest, WorkspaceMember},
    require_guard,
    services::{InviteOutcome, MembershipService},
    utils::AppError,
    AppState,
};

pub fn routes(state: &AppState) -> Router<AppState> {
    let workspace_admin = Router::new()
        .route("/", get(list_members).post(invite_member))
        .route("/{userId}", delete(remove_member))
        .route("/{userId}/role", patch(update_member_role))
        .route_layer(require_guard!(state, Guard::WorkspaceAdmin));

    // Invitees and leavers are not (or no longer need to be) active members
    let authenticated = Router::new()
        .route("/accept", post(accept_invite))
        .route("/decline", post(decline_invite))
        .route("/leave", delete(leave_workspace))
        .route_layer(require_guard!(state, Guard::Authenticated));

    workspace_admin.merge(authenticated)
}

async fn list_members(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<WorkspaceMember>>, AppError> {
    let workspace_id = ctx.require_workspace_id()?;
    Ok(Json(
        MembershipService::new(state.db, state.config.app)
            .list_members(workspace_id)
            .await?,
    ))
}

async fn invite_member(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<InviteMemberRequest>,
) -> Result<(StatusCode, Json<InviteOutcome>), AppError> {
    let workspace_id = ctx.require_workspace_id()?;
    let outcome = MembershipService::new(state.db, state.config.app)
        .invite(workspace_id, ctx.user_id(), &payload.email)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn accept_invite(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(workspace_id): Path<String>,
) -> Result<Json<Membership>, AppError> {
    let membership = MembershipService::new(state.db, state.config.app)
        .accept(&workspace_id, ctx.user_id())
        .await?;
    Ok(Json(membership))
}

async fn decline_invite(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(workspace_id): Path<String>,
) -> Result<Json<Membership>, AppError> {
    let membership = MembershipService::new(state.db, state.config.app)
        .decline(&workspace_id, ctx.user_id())
        .await?;
    Ok(Json(membership))
}

async fn leave_workspace(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(workspace_id): Path<String>,
) -> Result<StatusCode, AppError> {
    MembershipService::new(state.db, state.config.app)
        .leave(&workspace_id, ctx.user_id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_member(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((workspace_id, user_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    MembershipService::new(state.db, state.config.app)
        .remove(&workspace_id, ctx.user_id(), &user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_member_role(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((workspace_id, user_id)): Path<(String, String)>,
    Json(payload): Json<UpdateMemberRoleRequest>,
) -> Result<Json<Membership>, AppError> {
    let membership = MembershipService::new(state.db, state.config.app)
        .update_role(&workspace_id, ctx.user_id(), &user_id, payload.role)
        .await?;
    Ok(Json(membership))
}
