//! Health check endpoints
//!
//! Provides health check endpoints for monitoring and load balancers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use crate::{db::migrations, AppState};

/// Basic health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness response with the database and file storage status
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub storage: String,
}

fn component_status(name: &str, result: anyhow::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(component = name, error = %e, "Readiness check failed");
            false
        }
    }
}

fn health_label(ok: bool) -> String {
    let label = if ok { "healthy" } else { "unhealthy" };
    label.to_string()
}

/// Returns 200 while the process is up. Does not touch the database.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Returns 503 when the database or the file storage does not answer
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = component_status("database", migrations::ping(&state.db).await);
    let storage = component_status("storage", state.storage.ping().await);

    let (status_code, status) = if database && storage {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        status_code,
        Json(ReadinessResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: health_label(database),
            storage: health_label(storage),
        }),
    )
}
