//! Guest token issuance, scope, refresh and revocation over HTTP

use axum::{body::Body, http::Request};
use serde_json::{json, Value};
use workspace_hub::services::GuestVerification;

use crate::common::{email_of, ids, Tenant, TestApp, TEST_GUEST_WORKSPACE_ID};

fn trial_uri(workspace_id: &str) -> String {
    format!("/api/v1/workspaces/{}/trial-feature", workspace_id)
}

fn refresh_uri(workspace_id: &str) -> String {
    format!("/api/v1/guest-tokens/refresh/{}", workspace_id)
}

async fn global_admin(app: &TestApp) -> String {
    app.create_user(ids::GLOBAL_ADMIN, &email_of(ids::GLOBAL_ADMIN), true)
        .await;
    app.token_for(ids::GLOBAL_ADMIN)
}

#[tokio::test]
async fn test_issue_returns_plain_text_guest_token() {
    let app = TestApp::new().await;
    let response = app
        .post_json("/api/v1/guest-tokens/issue", None, json!({}))
        .await;
    response.assert_created();

    let content_type = response
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(content_type.starts_with("text/plain"));

    match app.state.guest_tokens.verify(&response.text()) {
        GuestVerification::Valid(claims) => {
            assert!(claims.guest);
            assert_eq!(claims.workspace_id, TEST_GUEST_WORKSPACE_ID);
        }
        other => panic!("expected a valid guest token, got {:?}", other),
    }
}

#[tokio::test]
async fn test_guest_trial_access_counts_usage() {
    let app = TestApp::new().await;
    let guest = app.issue_guest_token().await;

    let response = app.get(&trial_uri(TEST_GUEST_WORKSPACE_ID), Some(&guest)).await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["type"], "guest");
    assert_eq!(body["workspace_id"], TEST_GUEST_WORKSPACE_ID);
    assert_eq!(body["plan"], "free");
    assert_eq!(body["usage_count"], 1);

    let record = app.state.guest_tokens.validate(&guest, None).await.unwrap();
    assert_eq!(record.usage_count, 1);
}

#[tokio::test]
async fn test_guest_cannot_reach_other_workspaces() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let guest = app.issue_guest_token().await;

    // Valid, unexpired token but a different workspace id
    app.get(&trial_uri(&tenant.workspace_id), Some(&guest))
        .await
        .assert_forbidden();
    app.post_json(
        &refresh_uri(&tenant.workspace_id),
        Some(&guest),
        json!({ "token": guest }),
    )
    .await
    .assert_forbidden();
}

#[tokio::test]
async fn test_member_trial_access() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let owner = app.token_for(&tenant.owner_id);

    let response = app.get(&trial_uri(&tenant.workspace_id), Some(&owner)).await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["type"], "user");
    assert_eq!(body["user_id"], tenant.owner_id.as_str());
    assert_eq!(body["role"], "OWNER");
    assert_eq!(body["subscription_status"], "active");
}

#[tokio::test]
async fn test_refresh_rotates_token() {
    let app = TestApp::new().await;
    let admin = global_admin(&app).await;
    let old = app.issue_guest_token().await;

    let response = app
        .post_json(
            &refresh_uri(TEST_GUEST_WORKSPACE_ID),
            Some(&old),
            json!({ "token": old }),
        )
        .await;
    response.assert_created();
    let new = response.text();
    assert_ne!(new, old);

    match app.state.guest_tokens.verify(&new) {
        GuestVerification::Valid(claims) => {
            assert!(claims.guest);
            assert_eq!(claims.workspace_id, TEST_GUEST_WORKSPACE_ID);
        }
        other => panic!("expected a valid guest token, got {:?}", other),
    }

    // The old mirror row is gone
    app.get(&format!("/api/v1/guest-tokens/validate/{}", old), Some(&admin))
        .await
        .assert_not_found();
    app.get(&format!("/api/v1/guest-tokens/validate/{}", new), Some(&admin))
        .await
        .assert_ok();
}

#[tokio::test]
async fn test_refresh_requires_old_token() {
    let app = TestApp::new().await;
    let guest = app.issue_guest_token().await;

    app.post_json(&refresh_uri(TEST_GUEST_WORKSPACE_ID), Some(&guest), json!({}))
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_refresh_without_body_is_bad_request() {
    let app = TestApp::new().await;
    let guest = app.issue_guest_token().await;

    let request = Request::builder()
        .method("POST")
        .uri(refresh_uri(TEST_GUEST_WORKSPACE_ID))
        .header("Authorization", format!("Bearer {}", guest))
        .body(Body::empty())
        .unwrap();
    let response = app.request(request).await;
    response.assert_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "bad_request");
    assert_eq!(body["message"], "Token is required");
}

#[tokio::test]
async fn test_refresh_with_non_json_body_is_bad_request() {
    let app = TestApp::new().await;
    let guest = app.issue_guest_token().await;

    let request = Request::builder()
        .method("POST")
        .uri(refresh_uri(TEST_GUEST_WORKSPACE_ID))
        .header("Authorization", format!("Bearer {}", guest))
        .header("Content-Type", "text/plain")
        .body(Body::from(guest.clone()))
        .unwrap();
    let response = app.request(request).await;
    response.assert_bad_request();
    assert_eq!(response.json::<Value>()["message"], "Token is required");
}

#[tokio::test]
async fn test_revoke_is_terminal() {
    let app = TestApp::new().await;
    let admin = global_admin(&app).await;
    let guest = app.issue_guest_token().await;
    let uri = format!("/api/v1/guest-tokens/{}", guest);

    let response = app.delete(&uri, Some(&admin)).await;
    response.assert_ok();
    assert_eq!(response.json::<Value>(), json!({ "revoked": true }));

    app.delete(&uri, Some(&admin)).await.assert_not_found();
    app.delete(&uri, Some(&admin)).await.assert_not_found();
}

#[tokio::test]
async fn test_admin_token_listing() {
    let app = TestApp::new().await;
    let admin = global_admin(&app).await;
    let guest = app.issue_guest_token().await;

    let response = app
        .get("/api/v1/guest-tokens/workspace/active", Some(&admin))
        .await;
    response.assert_ok();
    let tokens: Vec<Value> = response.json();
    assert!(tokens.iter().any(|t| t["token"] == guest.as_str()));

    // Guests and plain members are not admins
    app.get("/api/v1/guest-tokens/workspace/active", Some(&guest))
        .await
        .assert_forbidden();
    app.create_user(ids::MEMBER, &email_of(ids::MEMBER), false)
        .await;
    app.get(
        "/api/v1/guest-tokens/workspace/active",
        Some(&app.token_for(ids::MEMBER)),
    )
    .await
    .assert_forbidden();
}
