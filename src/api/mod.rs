//! API routes and handlers
//!
//! This module defines all API endpoints and their routing. Every protected
//! route group declares its guard with [`require_guard!`](crate::require_guard).

use axum::{routing::get, Router};

use crate::AppState;

mod audit_events;
mod files;
mod guest_tokens;
mod health;
mod memberships;
mod notifications;
mod subscriptions;
mod users;
mod webhooks;
mod workspaces;

pub use health::*;

/// Public API routes (no authentication required)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // Health check endpoints
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        // Guest token issuance
        .nest("/guest-tokens", guest_tokens::public_routes())
        // Identity-provider webhooks (signature verified)
        .nest("/auth/webhooks", webhooks::routes())
}

/// Guarded API routes
pub fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest("/users", users::routes(state))
        .nest("/workspaces", workspaces::routes(state))
        .nest("/workspaces/{workspaceId}/files", files::routes(state))
        .nest(
            "/user-workspaces/{workspaceId}/members",
            memberships::routes(state),
        )
        .nest("/subscriptions", subscriptions::routes(state))
        .nest("/guest-tokens", guest_tokens::routes(state))
        .nest("/audit-events", audit_events::routes(state))
        .nest("/notifications", notifications::routes(state))
}

/// All API routes
pub fn routes(state: &AppState) -> Router<AppState> {
    public_routes().merge(protected_routes(state))
}
