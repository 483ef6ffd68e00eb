//! Guard chain tests through the full router

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use workspace_hub::{
    models::{MembershipRole, SubscriptionStatus},
    Guard, RequestContext,
};

use crate::common::{email_of, ids, member_token, Tenant, TestApp};

fn workspace_uri(workspace_id: &str) -> String {
    format!("/api/v1/workspaces/{}", workspace_id)
}

#[tokio::test]
async fn test_workspace_member_route_status_ladder() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let uri = workspace_uri(&tenant.workspace_id);

    // No token
    app.get(&uri, None).await.assert_unauthorized();

    // Authenticated, not a member
    app.create_user(ids::OUTSIDER, &email_of(ids::OUTSIDER), false)
        .await;
    let outsider = app.token_for(ids::OUTSIDER);
    app.get(&uri, Some(&outsider)).await.assert_forbidden();

    // Member of a workspace whose subscription is cancelled
    tenant.add_member(&app, ids::MEMBER, MembershipRole::Member).await;
    let member = app.token_for(ids::MEMBER);
    app.set_subscription_status(&tenant.workspace_id, SubscriptionStatus::Cancelled)
        .await;
    app.get(&uri, Some(&member)).await.assert_forbidden();

    // Active subscription, MEMBER role on an admin route
    app.set_subscription_status(&tenant.workspace_id, SubscriptionStatus::Active)
        .await;
    app.get(&uri, Some(&member)).await.assert_ok();
    app.patch_json(&uri, Some(&member), json!({ "name": "Renamed" }))
        .await
        .assert_forbidden();

    // OWNER on the same admin route
    let owner = app.token_for(&tenant.owner_id);
    let response = app
        .patch_json(&uri, Some(&owner), json!({ "name": "Renamed" }))
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["name"], "Renamed");
}

#[tokio::test]
async fn test_token_failures_share_one_response() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let uri = workspace_uri(&tenant.workspace_id);

    let missing = app.get(&uri, None).await;
    let garbage = app.get(&uri, Some("not-a-jwt")).await;
    let expired = app
        .get(&uri, Some(&member_token(&tenant.owner_id, 1_000_000)))
        .await;

    missing.assert_unauthorized();
    garbage.assert_unauthorized();
    expired.assert_unauthorized();
    assert_eq!(missing.body, garbage.body);
    assert_eq!(missing.body, expired.body);
}

#[tokio::test]
async fn test_disabled_account_is_rejected() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    app.disable_user(&tenant.owner_id).await;

    let owner = app.token_for(&tenant.owner_id);
    app.get(&workspace_uri(&tenant.workspace_id), Some(&owner))
        .await
        .assert_forbidden();
    app.get("/api/v1/workspaces/user", Some(&owner))
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_unknown_workspace_is_forbidden_for_non_members() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let owner = app.token_for(&tenant.owner_id);

    // Membership is checked before existence so ids do not leak
    app.get(&workspace_uri("does-not-exist"), Some(&owner))
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_admin_only_routes() {
    let app = TestApp::new().await;
    app.create_user(ids::GLOBAL_ADMIN, &email_of(ids::GLOBAL_ADMIN), true)
        .await;
    app.create_user(ids::MEMBER, &email_of(ids::MEMBER), false)
        .await;

    app.get("/api/v1/users", Some(&app.token_for(ids::MEMBER)))
        .await
        .assert_forbidden();

    let response = app
        .get("/api/v1/users", Some(&app.token_for(ids::GLOBAL_ADMIN)))
        .await;
    response.assert_ok();
    let users: Vec<Value> = response.json();
    assert_eq!(users.len(), 2);
}

#[tokio::test]
async fn test_unknown_subject_resolves_without_privileges() {
    let app = TestApp::new().await;

    // Verified token, no user row: authenticated but not an admin
    let token = app.token_for("user_not_in_db");
    app.get("/api/v1/workspaces/user", Some(&token))
        .await
        .assert_ok();
    app.get("/api/v1/users", Some(&token))
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_guest_token_is_refused_on_member_routes() {
    let app = TestApp::new().await;
    let guest = app.issue_guest_token().await;

    app.get("/api/v1/workspaces/user", Some(&guest))
        .await
        .assert_forbidden();
    app.get(
        &workspace_uri(crate::common::TEST_GUEST_WORKSPACE_ID),
        Some(&guest),
    )
    .await
    .assert_forbidden();
}

async fn resolved_workspace(ctx: RequestContext) -> String {
    ctx.workspace_id.unwrap_or_default()
}

/// WorkspaceMember route without a `{workspaceId}` path segment
fn workspace_echo_router(app: &TestApp) -> Router {
    Router::new()
        .route("/echo", get(resolved_workspace).post(resolved_workspace))
        .route_layer(workspace_hub::require_guard!(app.state, Guard::WorkspaceMember))
        .with_state(app.state.clone())
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&body).to_string())
}

#[tokio::test]
async fn test_workspace_id_fallback_order() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Body").await;
    let from_query = app.create_workspace(ids::OWNER, "Query").await.id;
    let from_header = app.create_workspace(ids::OWNER, "Header").await.id;
    let bearer = format!("Bearer {}", app.token_for(ids::OWNER));
    let router = workspace_echo_router(&app);

    // Body wins over query and header
    let request = Request::builder()
        .method("POST")
        .uri(format!("/echo?workspaceId={}", from_query))
        .header("Authorization", &bearer)
        .header("x-workspace-id", &from_header)
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "workspaceId": tenant.workspace_id }).to_string(),
        ))
        .unwrap();
    assert_eq!(
        call(&router, request).await,
        (StatusCode::OK, tenant.workspace_id.clone())
    );

    // Snake-case body key counts as the body
    let request = Request::builder()
        .method("POST")
        .uri(format!("/echo?workspaceId={}", from_query))
        .header("Authorization", &bearer)
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "workspace_id": tenant.workspace_id }).to_string(),
        ))
        .unwrap();
    assert_eq!(
        call(&router, request).await,
        (StatusCode::OK, tenant.workspace_id.clone())
    );

    // Query wins over header when the body has no id
    let request = Request::builder()
        .method("POST")
        .uri(format!("/echo?workspaceId={}", from_query))
        .header("Authorization", &bearer)
        .header("x-workspace-id", &from_header)
        .header("Content-Type", "application/json")
        .body(Body::from(json!({ "name": "unrelated" }).to_string()))
        .unwrap();
    assert_eq!(
        call(&router, request).await,
        (StatusCode::OK, from_query.clone())
    );

    // Header alone
    let request = Request::builder()
        .uri("/echo")
        .header("Authorization", &bearer)
        .header("x-workspace-id", &from_header)
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        call(&router, request).await,
        (StatusCode::OK, from_header.clone())
    );

    // Blank values are skipped
    let request = Request::builder()
        .uri("/echo?workspaceId=%20")
        .header("Authorization", &bearer)
        .header("x-workspace-id", &from_header)
        .body(Body::empty())
        .unwrap();
    assert_eq!(call(&router, request).await, (StatusCode::OK, from_header));
}

#[tokio::test]
async fn test_missing_workspace_id_is_forbidden() {
    let app = TestApp::new().await;
    Tenant::create(&app, "Acme").await;
    let router = workspace_echo_router(&app);

    let request = Request::builder()
        .method("POST")
        .uri("/echo")
        .header("Authorization", format!("Bearer {}", app.token_for(ids::OWNER)))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({}).to_string()))
        .unwrap();
    let (status, body) = call(&router, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["message"], "Workspace ID required");
}
