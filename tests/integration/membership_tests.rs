//! Membership lifecycle and last-admin protection

use serde_json::{json, Value};
use workspace_hub::models::MembershipRole;

use crate::common::{email_of, ids, Tenant, TestApp};

const INVITEE: &str = "user_invitee";

#[tokio::test]
async fn test_invite_accept_promote_and_last_admin_protection() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    app.create_user(INVITEE, "user@example.com", false).await;
    let owner = app.token_for(&tenant.owner_id);
    let invitee = app.token_for(INVITEE);
    let members = tenant.members_uri();

    // Invite: pending MEMBER
    let response = app
        .post_json(&members, Some(&owner), json!({ "email": "user@example.com" }))
        .await;
    response.assert_created();
    let invited: Value = response.json();
    assert_eq!(invited["status"], "pending");
    assert_eq!(invited["role"], "MEMBER");
    assert_eq!(invited["invited_by"], tenant.owner_id.as_str());

    let invites: Vec<Value> = app
        .get("/api/v1/workspaces/invites", Some(&invitee))
        .await
        .json();
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0]["workspace_id"], tenant.workspace_id.as_str());

    // Accept: active MEMBER
    let response = app
        .post_json(&format!("{}/accept", members), Some(&invitee), json!({}))
        .await;
    response.assert_ok();
    let accepted: Value = response.json();
    assert_eq!(accepted["status"], "active");
    assert_eq!(accepted["role"], "MEMBER");

    // Promote to ADMIN
    let response = app
        .patch_json(
            &format!("{}/{}/role", members, INVITEE),
            Some(&owner),
            json!({ "role": "ADMIN" }),
        )
        .await;
    response.assert_ok();
    assert_eq!(app.privileged_count(&tenant.workspace_id).await, 2);

    // Two privileged members: removing the owner is allowed
    app.delete(&format!("{}/{}", members, tenant.owner_id), Some(&invitee))
        .await
        .assert_no_content();
    assert_eq!(app.privileged_count(&tenant.workspace_id).await, 1);

    // The remaining admin can neither demote nor remove themselves
    app.patch_json(
        &format!("{}/{}/role", members, INVITEE),
        Some(&invitee),
        json!({ "role": "MEMBER" }),
    )
    .await
    .assert_bad_request();
    app.delete(&format!("{}/{}", members, INVITEE), Some(&invitee))
        .await
        .assert_forbidden();
    app.delete(&format!("{}/leave", members), Some(&invitee))
        .await
        .assert_forbidden();

    assert_eq!(app.privileged_count(&tenant.workspace_id).await, 1);

    // The removed owner lost access
    app.get(&format!("/api/v1/workspaces/{}", tenant.workspace_id), Some(&owner))
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_invite_validation() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    tenant.add_member(&app, ids::MEMBER, MembershipRole::Member).await;
    let owner = app.token_for(&tenant.owner_id);
    let members = tenant.members_uri();

    app.post_json(&members, Some(&owner), json!({ "email": "not-an-email" }))
        .await
        .assert_bad_request();

    // Already an active member
    app.post_json(&members, Some(&owner), json!({ "email": email_of(ids::MEMBER) }))
        .await
        .assert_bad_request();

    // No account yet: platform invite, nothing stored
    let response = app
        .post_json(&members, Some(&owner), json!({ "email": "nobody@example.com" }))
        .await;
    response.assert_created();
    assert_eq!(response.json::<Value>(), json!({}));

    // MEMBER role cannot reach the admin route
    app.post_json(
        &members,
        Some(&app.token_for(ids::MEMBER)),
        json!({ "email": "someone@example.com" }),
    )
    .await
    .assert_forbidden();
}

#[tokio::test]
async fn test_decline_then_reinvite() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    app.create_user(INVITEE, &email_of(INVITEE), false).await;
    let owner = app.token_for(&tenant.owner_id);
    let invitee = app.token_for(INVITEE);
    let members = tenant.members_uri();

    app.post_json(&members, Some(&owner), json!({ "email": email_of(INVITEE) }))
        .await
        .assert_created();
    let response = app
        .post_json(&format!("{}/decline", members), Some(&invitee), json!({}))
        .await;
    response.assert_ok();
    assert_eq!(response.json::<Value>()["status"], "removed");

    // Nothing left to accept
    app.post_json(&format!("{}/accept", members), Some(&invitee), json!({}))
        .await
        .assert_not_found();

    // A removed row can be invited again
    let response = app
        .post_json(&members, Some(&owner), json!({ "email": email_of(INVITEE) }))
        .await;
    response.assert_created();
    assert_eq!(response.json::<Value>()["status"], "pending");
}

#[tokio::test]
async fn test_member_can_leave_once() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    tenant.add_member(&app, ids::MEMBER, MembershipRole::Member).await;
    let member = app.token_for(ids::MEMBER);
    let leave = format!("{}/leave", tenant.members_uri());

    app.delete(&leave, Some(&member)).await.assert_no_content();
    app.delete(&leave, Some(&member)).await.assert_not_found();
}

#[tokio::test]
async fn test_member_can_leave_workspace_with_no_admins() {
    let app = TestApp::new().await;
    app.create_user(ids::OWNER, &email_of(ids::OWNER), false).await;
    app.create_user(ids::GLOBAL_ADMIN, &email_of(ids::GLOBAL_ADMIN), true)
        .await;
    let admin = app.token_for(ids::GLOBAL_ADMIN);

    // Created on someone else's behalf: the creator is a plain MEMBER
    let response = app
        .post_json(
            "/api/v1/workspaces",
            Some(&admin),
            json!({ "name": "Managed", "owner_id": ids::OWNER }),
        )
        .await;
    response.assert_created();
    let workspace_id = response.json::<Value>()["id"].as_str().unwrap().to_string();
    assert_eq!(app.privileged_count(&workspace_id).await, 0);

    let leave = format!("/api/v1/user-workspaces/{}/members/leave", workspace_id);
    app.delete(&leave, Some(&admin)).await.assert_no_content();
}

#[tokio::test]
async fn test_member_list_and_unknown_targets() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    tenant.add_member(&app, ids::ADMIN, MembershipRole::Admin).await;
    let owner = app.token_for(&tenant.owner_id);
    let members = tenant.members_uri();

    let list: Vec<Value> = app.get(&members, Some(&owner)).await.json();
    assert_eq!(list.len(), 2);
    assert!(list.iter().any(|m| m["email"] == email_of(ids::ADMIN).as_str()));

    app.delete(&format!("{}/user_ghost", members), Some(&owner))
        .await
        .assert_not_found();
    app.patch_json(
        &format!("{}/user_ghost/role", members),
        Some(&owner),
        json!({ "role": "ADMIN" }),
    )
    .await
    .assert_not_found();
}

#[tokio::test]
async fn test_concurrent_demotions_keep_one_admin() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    tenant.add_member(&app, ids::ADMIN, MembershipRole::Admin).await;
    let owner = app.token_for(&tenant.owner_id);
    let admin = app.token_for(ids::ADMIN);
    let members = tenant.members_uri();

    let demote_admin = format!("{}/{}/role", members, ids::ADMIN);
    let demote_owner = format!("{}/{}/role", members, tenant.owner_id);
    let (first, second) = tokio::join!(
        app.patch_json(&demote_admin, Some(&owner), json!({ "role": "MEMBER" })),
        app.patch_json(&demote_owner, Some(&admin), json!({ "role": "MEMBER" })),
    );

    let succeeded = [&first, &second]
        .iter()
        .filter(|r| r.status.is_success())
        .count();
    assert_eq!(succeeded, 1, "first: {}, second: {}", first.text(), second.text());
    assert_eq!(app.privileged_count(&tenant.workspace_id).await, 1);
}
