//! Guest token API endpoints
//!
//! Issue and refresh answer with the raw token as `text/plain`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{debug, info};

use crate::{
    middleware::{Guard, RequestContext},
    models::{GuestToken, RefreshGuestTokenRequest, RevokeGuestTokenResponse},
    require_guard,
    utils::AppError,
    AppState,
};

/// Unauthenticated issuance
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/issue", post(issue_token))
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let guest_or_member = Router::new()
        .route("/refresh/{workspaceId}", post(refresh_token))
        .route_layer(require_guard!(state, Guard::GuestOrWorkspaceMember));

    let admin = Router::new()
        .route("/validate/{token}", get(validate_token))
        .route("/workspace/active", get(list_active_tokens))
        .route("/{token}", delete(revoke_token))
        .route_layer(require_guard!(state, Guard::AdminOnly));

    guest_or_member.merge(admin)
}

async fn issue_token(State(state): State<AppState>) -> Result<(StatusCode, String), AppError> {
    let token = state.guest_tokens.issue().await?;
    Ok((StatusCode::CREATED, token))
}

async fn refresh_token(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<RefreshGuestTokenRequest>, JsonRejection>,
) -> Result<(StatusCode, String), AppError> {
    // A missing or unreadable body is the same client error as a missing field
    let payload = payload
        .inspect_err(|rejection| debug!(rejection = %rejection, "Unreadable refresh body"))
        .map(|Json(p)| p)
        .unwrap_or_default();
    let old_token = payload
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Token is required"))?;
    let workspace_id = ctx.require_workspace_id()?;

    let token = state.guest_tokens.refresh(&old_token, workspace_id).await?;
    Ok((StatusCode::CREATED, token))
}

async fn validate_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<GuestToken>, AppError> {
    Ok(Json(state.guest_tokens.validate(&token, None).await?))
}

async fn list_active_tokens(
    State(state): State<AppState>,
) -> Result<Json<Vec<GuestToken>>, AppError> {
    Ok(Json(state.guest_tokens.list_active().await?))
}

async fn revoke_token(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(token): Path<String>,
) -> Result<Json<RevokeGuestTokenResponse>, AppError> {
    state.guest_tokens.revoke(&token).await?;
    info!(actor_id = %ctx.user_id(), "Guest token revoked by admin");
    Ok(Json(RevokeGuestTokenResponse { revoked: true }))
}
