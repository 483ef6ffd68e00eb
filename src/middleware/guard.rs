//! Guard chain
//!
//! Each route declares one [`Guard`]. A guard is an ordered list of
//! [`Step`]s; the middleware runs them in order over a [`Resolving`] value
//! and stops at the first rejection. Only a request that passes every step
//! gets a [`RequestContext`].
//!
//! Usage:
//! ```ignore
//! Router::new()
//!     .route("/{workspaceId}", get(get_workspace))
//!     .route_layer(require_guard!(state, Guard::WorkspaceMember));
//! ```

use std::collections::HashMap;

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequestParts, Query, RawPathParams, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::auth::{extract_bearer_token, resolve_member, GuardRejection, RequestContext};
use crate::{
    db::{MembershipRepository, SubscriptionRepository, WorkspaceRepository},
    models::{Membership, Principal, Subscription, SubscriptionPlan, Workspace},
    services::GuestVerification,
    AppState,
};

/// Path parameter, body field and query key naming the workspace
pub const WORKSPACE_ID_PARAM: &str = "workspaceId";
const WORKSPACE_ID_SNAKE: &str = "workspace_id";
/// Last-resort source of the workspace id
pub const WORKSPACE_ID_HEADER: &str = "x-workspace-id";

/// Largest body buffered while looking for a workspace id
const MAX_GUARD_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Any enabled member
    Authenticated,
    /// Enabled member with `is_global_admin`
    AdminOnly,
    /// Active member of the workspace, with an active subscription
    WorkspaceMember,
    /// WorkspaceMember holding OWNER or ADMIN
    WorkspaceAdmin,
    /// Guest of the guest workspace, or an active member
    GuestOrWorkspaceMember,
}

/// One check of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RequireBearer,
    RequireWorkspaceId,
    ResolveMember,
    ResolveGuestOrMember,
    RequireEnabled,
    RequireGlobalAdmin,
    LoadMembership,
    LoadWorkspace,
    LoadActiveSubscription,
    RequireWorkspaceAdminRole,
    RequireAllowedPlan,
}

impl Guard {
    pub fn steps(self) -> &'static [Step] {
        use Step::*;
        match self {
            Guard::Authenticated => &[RequireBearer, ResolveMember, RequireEnabled],
            Guard::AdminOnly => &[RequireBearer, ResolveMember, RequireEnabled, RequireGlobalAdmin],
            Guard::WorkspaceMember => &[
                RequireBearer,
                ResolveMember,
                RequireEnabled,
                RequireWorkspaceId,
                LoadMembership,
                LoadWorkspace,
                LoadActiveSubscription,
            ],
            Guard::WorkspaceAdmin => &[
                RequireBearer,
                ResolveMember,
                RequireEnabled,
                RequireWorkspaceId,
                LoadMembership,
                LoadWorkspace,
                LoadActiveSubscription,
                RequireWorkspaceAdminRole,
            ],
            Guard::GuestOrWorkspaceMember => &[
                RequireBearer,
                RequireWorkspaceId,
                ResolveGuestOrMember,
                RequireEnabled,
                LoadMembership,
                LoadWorkspace,
                LoadActiveSubscription,
                RequireAllowedPlan,
            ],
        }
    }

    fn needs_workspace_id(self) -> bool {
        self.steps().contains(&Step::RequireWorkspaceId)
    }
}

/// Request inputs and whatever the steps so far have established
#[derive(Debug, Clone, Default)]
pub struct Resolving {
    bearer: Option<String>,
    requested_workspace_id: Option<String>,
    principal: Option<Principal>,
    guest_token: Option<String>,
    membership: Option<Membership>,
    workspace: Option<Workspace>,
    subscription: Option<Subscription>,
    plan: Option<SubscriptionPlan>,
}

impl Resolving {
    pub fn new(bearer: Option<String>, requested_workspace_id: Option<String>) -> Self {
        Self {
            bearer,
            requested_workspace_id,
            ..Default::default()
        }
    }

    fn bearer(&self) -> Result<&str, GuardRejection> {
        self.bearer.as_deref().ok_or(GuardRejection::MissingToken)
    }

    fn workspace_id(&self) -> Result<&str, GuardRejection> {
        self.requested_workspace_id
            .as_deref()
            .ok_or_else(|| GuardRejection::forbidden("Workspace ID required"))
    }

    fn principal(&self) -> Result<&Principal, GuardRejection> {
        self.principal.as_ref().ok_or(GuardRejection::MissingToken)
    }

    fn into_context(self) -> Result<RequestContext, GuardRejection> {
        let principal = self.principal.ok_or(GuardRejection::MissingToken)?;
        Ok(RequestContext {
            principal,
            workspace_id: self.requested_workspace_id,
            workspace: self.workspace,
            membership: self.membership,
            subscription: self.subscription,
            plan: self.plan,
            guest_token: self.guest_token,
        })
    }
}

/// Run every step of `guard`, producing the request context
pub async fn run_guard(
    state: &AppState,
    guard: Guard,
    mut resolving: Resolving,
) -> Result<RequestContext, GuardRejection> {
    for step in guard.steps() {
        resolving = apply_step(state, guard, *step, resolving).await?;
    }
    resolving.into_context()
}

async fn apply_step(
    state: &AppState,
    guard: Guard,
    step: Step,
    mut r: Resolving,
) -> Result<Resolving, GuardRejection> {
    match step {
        Step::RequireBearer => {
            r.bearer()?;
        }
        Step::RequireWorkspaceId => {
            r.workspace_id()?;
        }
        Step::ResolveMember => {
            let token = r.bearer()?;
            // A working guest token is a valid credential of the wrong kind
            if let GuestVerification::Valid(_) = state.guest_tokens.verify(token) {
                return Err(GuardRejection::forbidden("Guest access is not allowed here"));
            }
            r.principal = Some(resolve_member(state, token).await?);
        }
        Step::ResolveGuestOrMember => {
            let token = r.bearer()?.to_string();
            match state.guest_tokens.verify(&token) {
                GuestVerification::Valid(claims) => {
                    if r.workspace_id()? != claims.workspace_id {
                        return Err(GuardRejection::forbidden("Workspace ID mismatch for guest"));
                    }
                    if claims.workspace_id != state.guest_tokens.guest_workspace_id() {
                        return Err(GuardRejection::forbidden(
                            "Guests may only access the guest workspace",
                        ));
                    }
                    r.principal = Some(Principal::guest());
                    r.guest_token = Some(token);
                }
                GuestVerification::Invalid(reason) => {
                    debug!(reason = %reason, "Unusable guest token, trying member verification");
                    r.principal = Some(resolve_member(state, &token).await?);
                }
                GuestVerification::NotAGuestToken => {
                    r.principal = Some(resolve_member(state, &token).await?);
                }
            }
        }
        Step::RequireEnabled => {
            if r.principal()?.is_disabled {
                return Err(GuardRejection::DisabledAccount);
            }
        }
        Step::RequireGlobalAdmin => {
            if !r.principal()?.is_global_admin {
                return Err(GuardRejection::forbidden("Admin privileges required"));
            }
        }
        Step::LoadMembership => {
            let principal = r.principal()?;
            if principal.is_guest() {
                return Ok(r);
            }
            let membership = MembershipRepository::new(&state.db)
                .get(&principal.id, r.workspace_id()?)
                .await?
                .filter(Membership::is_active)
                .ok_or_else(|| GuardRejection::forbidden("Not an active member of this workspace"))?;
            r.membership = Some(membership);
        }
        Step::LoadWorkspace => {
            let workspace = WorkspaceRepository::new(&state.db)
                .get_by_id(r.workspace_id()?)
                .await?;
            r.workspace = Some(workspace.ok_or_else(|| match guard {
                Guard::GuestOrWorkspaceMember => {
                    GuardRejection::forbidden("Workspace not available")
                }
                _ => GuardRejection::NotFound("Workspace not found".to_string()),
            })?);
        }
        Step::LoadActiveSubscription => {
            let subscription = SubscriptionRepository::new(&state.db)
                .get_by_workspace(r.workspace_id()?)
                .await?
                .filter(Subscription::is_active)
                .ok_or_else(|| GuardRejection::forbidden("Active subscription required"))?;
            r.plan = subscription.known_plan();
            r.subscription = Some(subscription);
        }
        Step::RequireWorkspaceAdminRole => {
            let privileged = r
                .membership
                .as_ref()
                .is_some_and(|m| m.role.is_privileged());
            if !privileged {
                return Err(GuardRejection::forbidden("Workspace admin or owner role required"));
            }
        }
        Step::RequireAllowedPlan => {
            // The plan column is free text
            if r.plan.is_none() {
                return Err(GuardRejection::forbidden("Subscription plan not allowed"));
            }
        }
    }
    Ok(r)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn workspace_id_from_json(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    non_empty(value.get(WORKSPACE_ID_PARAM).and_then(|v| v.as_str()))
        .or_else(|| non_empty(value.get(WORKSPACE_ID_SNAKE).and_then(|v| v.as_str())))
}

/// Workspace id from path, then body, then query, then header
async fn extract_workspace_id(
    state: &AppState,
    parts: &mut Parts,
    body: Body,
) -> Result<(Option<String>, Body), GuardRejection> {
    if let Ok(params) = RawPathParams::from_request_parts(parts, state).await {
        let from_path = params
            .iter()
            .find(|(name, _)| *name == WORKSPACE_ID_PARAM)
            .and_then(|(_, value)| non_empty(Some(value)));
        if from_path.is_some() {
            return Ok((from_path, body));
        }
    }

    let bytes = to_bytes(body, MAX_GUARD_BODY_BYTES)
        .await
        .map_err(|_| GuardRejection::forbidden("Request body too large"))?;
    if let Some(id) = workspace_id_from_json(&bytes) {
        return Ok((Some(id), Body::from(bytes)));
    }

    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or_default();
    let from_query = non_empty(query.get(WORKSPACE_ID_PARAM).map(String::as_str))
        .or_else(|| non_empty(query.get(WORKSPACE_ID_SNAKE).map(String::as_str)));
    if from_query.is_some() {
        return Ok((from_query, Body::from(bytes)));
    }

    let from_header = non_empty(
        parts
            .headers
            .get(WORKSPACE_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    Ok((from_header, Body::from(bytes)))
}

/// Guard middleware; see [`require_guard!`](crate::require_guard)
pub async fn guard_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
    guard: Guard,
) -> Result<Response, GuardRejection> {
    let (mut parts, body) = request.into_parts();
    let bearer = extract_bearer_token(&parts.headers).map(str::to_string);

    let (workspace_id, body) = if guard.needs_workspace_id() {
        extract_workspace_id(&state, &mut parts, body).await?
    } else {
        (None, body)
    };

    let context = run_guard(&state, guard, Resolving::new(bearer, workspace_id))
        .await
        .inspect_err(|rejection| {
            warn!(
                guard = ?guard,
                path = %parts.uri.path(),
                rejection = ?rejection,
                "Request rejected by guard"
            );
        })?;

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Create a middleware layer that enforces a guard
#[macro_export]
macro_rules! require_guard {
    ($state:expr, $guard:expr) => {
        axum::middleware::from_fn_with_state($state.clone(), move |state, req, next| {
            $crate::middleware::guard::guard_middleware(state, req, next, $guard)
        })
    };
}
