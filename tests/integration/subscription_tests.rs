//! Subscription reads and admin changes

use serde_json::{json, Value};

use crate::common::{email_of, ids, Tenant, TestApp};

async fn admin_token(app: &TestApp) -> String {
    app.create_user(ids::GLOBAL_ADMIN, &email_of(ids::GLOBAL_ADMIN), true)
        .await;
    app.token_for(ids::GLOBAL_ADMIN)
}

fn admin_uri(workspace_id: &str, action: &str) -> String {
    format!("/api/v1/subscriptions/workspace/{}/{}", workspace_id, action)
}

#[tokio::test]
async fn test_member_reads_default_subscription() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;

    let response = app
        .get(
            &format!("/api/v1/subscriptions/workspace/{}", tenant.workspace_id),
            Some(&app.token_for(&tenant.owner_id)),
        )
        .await;
    response.assert_ok();
    let sub: Value = response.json();
    assert_eq!(sub["workspace_id"], tenant.workspace_id.as_str());
    assert_eq!(sub["plan"], "free");
    assert_eq!(sub["status"], "active");
    assert_eq!(sub["billing_period"], "monthly");
}

#[tokio::test]
async fn test_admin_plan_changes() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let admin = admin_token(&app).await;

    let response = app
        .patch_json(
            &admin_uri(&tenant.workspace_id, "upgrade"),
            Some(&admin),
            json!({ "plan": "pro", "billingPeriod": "annual", "seats": 2 }),
        )
        .await;
    response.assert_ok();
    let sub: Value = response.json();
    assert_eq!(sub["plan"], "pro");
    assert_eq!(sub["billing_period"], "annual");
    assert_eq!(sub["seats"], 2);

    let response = app
        .patch_json(
            &admin_uri(&tenant.workspace_id, "billing"),
            Some(&admin),
            json!({ "billing_period": "monthly" }),
        )
        .await;
    response.assert_ok();
    assert_eq!(response.json::<Value>()["billing_period"], "monthly");

    let response = app
        .patch_json(
            &admin_uri(&tenant.workspace_id, "billing"),
            Some(&admin),
            json!({ "billing_period": "yearly" }),
        )
        .await;
    response.assert_ok();
    assert_eq!(response.json::<Value>()["billing_period"], "annual");

    app.patch_json(
        &admin_uri(&tenant.workspace_id, "billing"),
        Some(&admin),
        json!({ "billing_period": "weekly" }),
    )
    .await
    .assert_bad_request();

    let pro: Vec<Value> = app
        .get("/api/v1/subscriptions/all?plan=pro", Some(&admin))
        .await
        .json();
    assert_eq!(pro.len(), 1);
    assert_eq!(pro[0]["workspace_id"], tenant.workspace_id.as_str());
}

#[tokio::test]
async fn test_status_and_record_limit() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let admin = admin_token(&app).await;

    let response = app
        .patch_json(
            &admin_uri(&tenant.workspace_id, "record-limit"),
            Some(&admin),
            json!({ "newLimit": 5000 }),
        )
        .await;
    response.assert_ok();
    assert_eq!(response.json::<Value>()["record_limit"], 5000);

    app.patch_json(
        &admin_uri(&tenant.workspace_id, "record-limit"),
        Some(&admin),
        json!({ "newLimit": -1 }),
    )
    .await
    .assert_bad_request();

    let response = app
        .patch_json(
            &admin_uri(&tenant.workspace_id, "status"),
            Some(&admin),
            json!({ "status": "past_due" }),
        )
        .await;
    response.assert_ok();
    assert_eq!(response.json::<Value>()["status"], "past_due");

    // Inactive subscriptions close member routes
    app.get(
        &format!("/api/v1/subscriptions/workspace/{}", tenant.workspace_id),
        Some(&app.token_for(&tenant.owner_id)),
    )
    .await
    .assert_forbidden();
}

#[tokio::test]
async fn test_admin_routes_are_admin_only() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let admin = admin_token(&app).await;
    let owner = app.token_for(&tenant.owner_id);

    app.get("/api/v1/subscriptions/all", Some(&owner))
        .await
        .assert_forbidden();
    app.patch_json(
        &admin_uri(&tenant.workspace_id, "upgrade"),
        Some(&owner),
        json!({ "plan": "enterprise", "billingPeriod": "monthly" }),
    )
    .await
    .assert_forbidden();

    app.patch_json(
        &admin_uri("no-such-workspace", "status"),
        Some(&admin),
        json!({ "status": "active" }),
    )
    .await
    .assert_not_found();
}
