//! Notifications over HTTP: invite notifications, inbox and admin send

use serde_json::{json, Value};

use crate::common::{email_of, ids, test_config, Tenant, TestApp};

const INVITEE: &str = "user_invitee";

async fn global_admin(app: &TestApp) -> String {
    app.create_user(ids::GLOBAL_ADMIN, &email_of(ids::GLOBAL_ADMIN), true)
        .await;
    app.token_for(ids::GLOBAL_ADMIN)
}

#[tokio::test]
async fn test_invite_lands_in_invitee_inbox() {
    let mut config = test_config();
    config.app.url = "https://hub.example.com".to_string();
    config.app.name = "Hub".to_string();
    let app = TestApp::with_config(config).await;
    let tenant = Tenant::create(&app, "Acme").await;
    app.create_user(INVITEE, &email_of(INVITEE), false).await;
    let owner = app.token_for(&tenant.owner_id);
    let invitee = app.token_for(INVITEE);

    app.post_json(
        &tenant.members_uri(),
        Some(&owner),
        json!({ "email": email_of(INVITEE) }),
    )
    .await
    .assert_created();

    let response = app.get("/api/v1/notifications", Some(&invitee)).await;
    response.assert_ok();
    let inbox: Vec<Value> = response.json();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["type"], "workspace-invite");
    assert_eq!(inbox[0]["sent_via"], "email");
    assert_eq!(inbox[0]["payload"]["workspaceName"], "Acme");
    assert_eq!(inbox[0]["payload"]["appName"], "Hub");
    assert_eq!(inbox[0]["payload"]["appUrl"], "https://hub.example.com");
    assert!(inbox[0]["read_at"].is_null());

    // The inviter's inbox stays empty
    let owner_inbox: Vec<Value> = app.get("/api/v1/notifications", Some(&owner)).await.json();
    assert!(owner_inbox.is_empty());
}

#[tokio::test]
async fn test_platform_invite_is_recorded_without_recipient() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let owner = app.token_for(&tenant.owner_id);
    let admin = global_admin(&app).await;

    app.post_json(
        &tenant.members_uri(),
        Some(&owner),
        json!({ "email": "newcomer@example.com" }),
    )
    .await
    .assert_created();

    let all: Vec<Value> = app
        .get("/api/v1/notifications/admin/all", Some(&admin))
        .await
        .json();
    let platform: Vec<&Value> = all
        .iter()
        .filter(|n| n["type"] == "platform-invite")
        .collect();
    assert_eq!(platform.len(), 1);
    assert!(platform[0]["user_id"].is_null());
    assert_eq!(platform[0]["payload"]["email"], "newcomer@example.com");
}

#[tokio::test]
async fn test_read_and_dismiss_are_owner_only() {
    let app = TestApp::new().await;
    let admin = global_admin(&app).await;
    app.create_user(ids::MEMBER, &email_of(ids::MEMBER), false).await;
    app.create_user(ids::OUTSIDER, &email_of(ids::OUTSIDER), false)
        .await;
    let member = app.token_for(ids::MEMBER);
    let outsider = app.token_for(ids::OUTSIDER);

    let mut ids_sent = Vec::new();
    for kind in ["welcome", "subscription-expiring"] {
        let response = app
            .post_json(
                "/api/v1/notifications/admin/send",
                Some(&admin),
                json!({ "user_id": ids::MEMBER, "type": kind, "payload": { "plan": "pro" } }),
            )
            .await;
        response.assert_created();
        let sent: Value = response.json();
        assert_eq!(sent["sent_via"], "in_app");
        ids_sent.push(sent["id"].as_str().unwrap().to_string());
    }

    let read_uri = format!("/api/v1/notifications/{}/read", ids_sent[0]);
    let dismiss_uri = format!("/api/v1/notifications/{}/dismiss", ids_sent[0]);

    // Someone else's notification looks missing
    app.patch_json(&read_uri, Some(&outsider), json!({}))
        .await
        .assert_not_found();
    app.patch_json(&dismiss_uri, Some(&outsider), json!({}))
        .await
        .assert_not_found();
    app.patch_json("/api/v1/notifications/missing/read", Some(&member), json!({}))
        .await
        .assert_not_found();

    let response = app.patch_json(&read_uri, Some(&member), json!({})).await;
    response.assert_ok();
    assert!(!response.json::<Value>()["read_at"].is_null());

    let unread: Vec<Value> = app
        .get("/api/v1/notifications?unreadOnly=true", Some(&member))
        .await
        .json();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0]["id"], ids_sent[1].as_str());

    let all: Vec<Value> = app
        .get("/api/v1/notifications?unreadOnly=false", Some(&member))
        .await
        .json();
    assert_eq!(all.len(), 2);

    let response = app.patch_json(&dismiss_uri, Some(&member), json!({})).await;
    response.assert_ok();
    assert!(!response.json::<Value>()["dismissed_at"].is_null());
}

#[tokio::test]
async fn test_admin_routes_require_global_admin() {
    let app = TestApp::new().await;
    let admin = global_admin(&app).await;
    app.create_user(ids::MEMBER, &email_of(ids::MEMBER), false).await;
    let member = app.token_for(ids::MEMBER);

    app.get("/api/v1/notifications/admin/all", Some(&member))
        .await
        .assert_forbidden();
    app.post_json(
        "/api/v1/notifications/admin/send",
        Some(&member),
        json!({ "user_id": ids::MEMBER, "type": "welcome" }),
    )
    .await
    .assert_forbidden();
    app.get("/api/v1/notifications", None)
        .await
        .assert_unauthorized();

    // Invalid type and unknown recipient
    app.post_json(
        "/api/v1/notifications/admin/send",
        Some(&admin),
        json!({ "user_id": ids::MEMBER, "type": "not valid" }),
    )
    .await
    .assert_bad_request();
    app.post_json(
        "/api/v1/notifications/admin/send",
        Some(&admin),
        json!({ "user_id": "nobody", "type": "welcome" }),
    )
    .await
    .assert_not_found();
}
