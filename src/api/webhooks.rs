//! Identity-provider webhook endpoint
//!
//! Authenticated by signature instead of a bearer token.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    services::{
        webhook::{unix_now, verify_signature, SignatureHeaders, WebhookError},
        WebhookEvent, WebhookService,
    },
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/clerk", post(clerk_webhook))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let secret = state
        .config
        .identity
        .webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(WebhookError::NotConfigured)?;

    let signature = SignatureHeaders {
        id: header(&headers, "svix-id"),
        timestamp: header(&headers, "svix-timestamp"),
        signature: header(&headers, "svix-signature"),
    };
    verify_signature(secret, &signature, &body, unix_now()).inspect_err(|e| {
        warn!(reason = %e, svix_id = %signature.id, "Webhook signature rejected");
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("Invalid webhook payload: {}", e)))?;

    let outcome = WebhookService::new(state.db).handle(event).await?;
    debug!(outcome = ?outcome, "Webhook processed");

    Ok(Json(json!({ "received": true })))
}
