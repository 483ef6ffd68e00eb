//! Audit event API endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::{
    db::AuditRepository,
    middleware::{Guard, RequestContext},
    models::{AuditEvent, AuditEventQuery, CreateAuditEventRequest},
    require_guard,
    utils::AppError,
    AppState,
};

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/", get(query_events).post(create_event))
        .route("/admin/all", get(list_all_events))
        .route_layer(require_guard!(state, Guard::AdminOnly));

    let authenticated = Router::new()
        .route("/user", get(list_my_events))
        .route_layer(require_guard!(state, Guard::Authenticated));

    let member = Router::new()
        .route("/workspace/{workspaceId}", get(list_workspace_events))
        .route_layer(require_guard!(state, Guard::WorkspaceMember));

    admin.merge(authenticated).merge(member)
}

fn internal(action: &str, e: anyhow::Error) -> AppError {
    tracing::error!("Failed to {}: {:#}", action, e);
    AppError::internal(format!("Failed to {}", action))
}

async fn create_event(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateAuditEventRequest>,
) -> Result<(StatusCode, Json<AuditEvent>), AppError> {
    let event_type = payload.event_type.trim();
    if event_type.is_empty() {
        return Err(AppError::bad_request("eventType is required"));
    }

    let actor_id = payload.actor_id.as_deref().unwrap_or(ctx.user_id());
    let event = AuditRepository::new(&state.db)
        .insert(
            event_type,
            Some(actor_id),
            payload.workspace_id.as_deref(),
            payload.details.as_ref(),
        )
        .await
        .map_err(|e| internal("create audit event", e))?;

    Ok((StatusCode::CREATED, Json(event)))
}

async fn query_events(
    State(state): State<AppState>,
    Query(query): Query<AuditEventQuery>,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let events = AuditRepository::new(&state.db)
        .list(&query)
        .await
        .map_err(|e| internal("query audit events", e))?;
    Ok(Json(events))
}

async fn list_all_events(State(state): State<AppState>) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let events = AuditRepository::new(&state.db)
        .list(&AuditEventQuery::default())
        .await
        .map_err(|e| internal("list audit events", e))?;
    Ok(Json(events))
}

async fn list_my_events(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let events = AuditRepository::new(&state.db)
        .list_by_actor(ctx.user_id())
        .await
        .map_err(|e| internal("list audit events", e))?;
    Ok(Json(events))
}

async fn list_workspace_events(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let workspace_id = ctx.require_workspace_id()?;
    let events = AuditRepository::new(&state.db)
        .list_by_workspace(workspace_id)
        .await
        .map_err(|e| internal("list workspace audit events", e))?;
    Ok(Json(events))
}
