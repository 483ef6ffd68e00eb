//! Notification API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::info;

use crate::{
    middleware::{Guard, RequestContext},
    models::{Notification, NotificationQuery, SendNotificationRequest},
    require_guard,
    services::NotificationService,
    utils::AppError,
    AppState,
};

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/admin/all", get(list_all_notifications))
        .route("/admin/send", post(send_notification))
        .route_layer(require_guard!(state, Guard::AdminOnly));

    let authenticated = Router::new()
        .route("/", get(list_my_notifications))
        .route("/{id}/read", patch(mark_read))
        .route("/{id}/dismiss", patch(dismiss))
        .route_layer(require_guard!(state, Guard::Authenticated));

    admin.merge(authenticated)
}

async fn list_all_notifications(
    State(state): State<AppState>,
) -> Result<Json<Vec<Notification>>, AppError> {
    info!("Admin listing all notifications");
    Ok(Json(NotificationService::new(state.db).list_all().await?))
}

async fn send_notification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<SendNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    info!(user_id = %payload.user_id, kind = %payload.kind, "Admin sending notification");
    let notification = NotificationService::new(state.db)
        .send(ctx.user_id(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

async fn list_my_notifications(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(
        NotificationService::new(state.db)
            .list_for_user(ctx.user_id(), query.unread_only)
            .await?,
    ))
}

async fn mark_read(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(
        NotificationService::new(state.db)
            .mark_read(ctx.user_id(), &id)
            .await?,
    ))
}

async fn dismiss(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(
        NotificationService::new(state.db)
            .dismiss(ctx.user_id(), &id)
            .await?,
    ))
}
