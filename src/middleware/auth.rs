//! Principal resolution
//!
//! Turns the bearer token of a request into a [`Principal`] and defines the
//! [`RequestContext`] the guard chain hands to handlers.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use crate::{
    db::UserRepository,
    models::{Membership, Principal, Subscription, SubscriptionPlan, Workspace},
    utils::{AppError, ErrorResponse},
    AppState,
};

/// Body of every 401 produced by the guard chain
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired user/guest token";

/// Why the guard chain stopped a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardRejection {
    MissingToken,
    InvalidToken,
    DisabledAccount,
    Forbidden(String),
    NotFound(String),
    /// Storage failure while resolving; details stay in the logs
    Internal(String),
}

impl GuardRejection {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        GuardRejection::Forbidden(reason.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GuardRejection::MissingToken | GuardRejection::InvalidToken => StatusCode::UNAUTHORIZED,
            GuardRejection::DisabledAccount | GuardRejection::Forbidden(_) => StatusCode::FORBIDDEN,
            GuardRejection::NotFound(_) => StatusCode::NOT_FOUND,
            GuardRejection::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            // Missing, malformed, expired and forged tokens look the same
            GuardRejection::MissingToken | GuardRejection::InvalidToken => {
                ErrorResponse::new("unauthorized", INVALID_TOKEN_MESSAGE)
            }
            GuardRejection::DisabledAccount => {
                ErrorResponse::new("forbidden", "Account is disabled")
            }
            GuardRejection::Forbidden(reason) => ErrorResponse::new("forbidden", reason),
            GuardRejection::NotFound(reason) => ErrorResponse::new("not_found", reason),
            GuardRejection::Internal(detail) => {
                error!(error = %detail, "Guard chain failed");
                ErrorResponse::new("internal_error", "An internal error occurred")
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for GuardRejection {
    fn from(err: anyhow::Error) -> Self {
        GuardRejection::Internal(format!("{:#}", err))
    }
}

/// Authorization outcome attached to a request that passed its guard.
///
/// Built once by the guard chain and never modified afterwards; handlers
/// read it through the extractor.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub workspace_id: Option<String>,
    pub workspace: Option<Workspace>,
    pub membership: Option<Membership>,
    pub subscription: Option<Subscription>,
    pub plan: Option<SubscriptionPlan>,
    /// Raw bearer of a guest principal, for usage accounting
    pub guest_token: Option<String>,
}

impl RequestContext {
    pub fn user_id(&self) -> &str {
        &self.principal.id
    }

    /// Workspace id the guard resolved; only guards that need one set it
    pub fn require_workspace_id(&self) -> Result<&str, AppError> {
        self.workspace_id
            .as_deref()
            .ok_or_else(|| AppError::bad_request("Workspace ID required"))
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = GuardRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or(GuardRejection::MissingToken)
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify a member token and enrich it with the stored privilege flags.
///
/// An unknown user resolves with both flags false; a disabled one still
/// resolves so callers decide how to treat it.
pub async fn resolve_member(state: &AppState, token: &str) -> Result<Principal, GuardRejection> {
    let claims = state.identity.verify(token).await.map_err(|reason| {
        warn!(reason = %reason, "Member token rejected");
        GuardRejection::InvalidToken
    })?;

    let flags = UserRepository::new(&state.db)
        .get_flags(&claims.sub)
        .await?
        .unwrap_or_default();

    Ok(Principal::member(
        claims.sub,
        claims.email,
        flags.is_global_admin,
        flags.is_disabled,
    ))
}
