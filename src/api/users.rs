//! User API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};

use crate::{
    middleware::{Guard, RequestContext},
    models::{CreateUserRequest, UpdateUserRequest, User},
    require_guard,
    services::UserService,
    utils::AppError,
    AppState,
};

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", axum::routing::delete(delete_user))
        .route_layer(require_guard!(state, Guard::AdminOnly));

    let authenticated = Router::new()
        .route("/{id}", get(get_user).patch(update_user))
        .route_layer(require_guard!(state, Guard::Authenticated));

    let member = Router::new()
        .route(
            "/me/primary-workspace/{workspaceId}",
            patch(set_primary_workspace),
        )
        .route_layer(require_guard!(state, Guard::WorkspaceMember));

    admin.merge(authenticated).merge(member)
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(UserService::new(state.db).list().await?))
}

async fn create_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = UserService::new(state.db)
        .create(ctx.user_id(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    Ok(Json(UserService::new(state.db).get(&ctx.principal, &id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let user = UserService::new(state.db)
        .update(&ctx.principal, &id, &payload)
        .await?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    UserService::new(state.db).delete(ctx.user_id(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_primary_workspace(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<User>, AppError> {
    let workspace_id = ctx.require_workspace_id()?;
    let user = UserService::new(state.db)
        .set_primary_workspace(ctx.user_id(), workspace_id)
        .await?;
    Ok(Json(user))
}
