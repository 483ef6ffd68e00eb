//! Audit event recording and listing

use serde_json::{json, Value};
use workspace_hub::models::MembershipRole;

use crate::common::{email_of, ids, Tenant, TestApp};

#[tokio::test]
async fn test_admin_records_events() {
    let app = TestApp::new().await;
    app.create_user(ids::GLOBAL_ADMIN, &email_of(ids::GLOBAL_ADMIN), true)
        .await;
    let admin = app.token_for(ids::GLOBAL_ADMIN);

    app.post_json("/api/v1/audit-events", Some(&admin), json!({ "eventType": "  " }))
        .await
        .assert_bad_request();

    let response = app
        .post_json(
            "/api/v1/audit-events",
            Some(&admin),
            json!({ "eventType": "billing.exported", "details": { "rows": 12 } }),
        )
        .await;
    response.assert_created();
    let event: Value = response.json();
    assert_eq!(event["event_type"], "billing.exported");
    assert_eq!(event["actor_id"], ids::GLOBAL_ADMIN);
    assert_eq!(event["details"]["rows"], 12);

    let found: Vec<Value> = app
        .get("/api/v1/audit-events?eventType=billing.exported", Some(&admin))
        .await
        .json();
    assert_eq!(found.len(), 1);

    let mine: Vec<Value> = app
        .get("/api/v1/audit-events/user", Some(&admin))
        .await
        .json();
    assert!(mine.iter().any(|e| e["event_type"] == "billing.exported"));
}

#[tokio::test]
async fn test_membership_changes_are_audited() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    tenant.add_member(&app, ids::MEMBER, MembershipRole::Member).await;
    let owner = app.token_for(&tenant.owner_id);

    app.patch_json(
        &format!("{}/{}/role", tenant.members_uri(), ids::MEMBER),
        Some(&owner),
        json!({ "role": "ADMIN" }),
    )
    .await
    .assert_ok();

    let events: Vec<Value> = app
        .get(
            &format!("/api/v1/audit-events/workspace/{}", tenant.workspace_id),
            Some(&owner),
        )
        .await
        .json();
    let types: Vec<&str> = events
        .iter()
        .filter_map(|e| e["event_type"].as_str())
        .collect();
    assert!(types.contains(&"workspace.created"));
    assert!(types.contains(&"membership.role_updated"));

    // Plain users cannot query the whole trail
    app.get("/api/v1/audit-events", Some(&app.token_for(ids::MEMBER)))
        .await
        .assert_forbidden();
}
