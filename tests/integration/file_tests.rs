//! Workspace file upload, listing, download and deletion over HTTP

use axum::{body::Body, http::Request};
use serde_json::Value;
use workspace_hub::models::{MembershipRole, SubscriptionStatus};

use crate::common::{email_of, ids, test_config, Tenant, TestApp, TestResponse};

fn files_uri(workspace_id: &str) -> String {
    format!("/api/v1/workspaces/{}/files", workspace_id)
}

async fn upload(
    app: &TestApp,
    workspace_id: &str,
    token: &str,
    file_name: &str,
    content: &'static [u8],
) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(format!(
            "{}/upload?fileName={}",
            files_uri(workspace_id),
            file_name
        ))
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "text/plain")
        .body(Body::from(content))
        .unwrap();
    app.request(request).await
}

#[tokio::test]
async fn test_upload_list_download_delete() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let owner = app.token_for(&tenant.owner_id);

    let response = upload(
        &app,
        &tenant.workspace_id,
        &owner,
        "notes.txt",
        b"hello world",
    )
    .await;
    response.assert_created();
    let file: Value = response.json();
    assert_eq!(file["file_name"], "notes.txt");
    assert_eq!(file["mime_type"], "text/plain");
    assert_eq!(file["size_bytes"], 11);
    assert_eq!(file["workspace_id"], tenant.workspace_id.as_str());
    let file_id = file["id"].as_str().unwrap().to_string();

    let listed: Vec<Value> = app
        .get(&files_uri(&tenant.workspace_id), Some(&owner))
        .await
        .json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], file_id.as_str());

    let download_uri = format!("{}/{}/download", files_uri(&tenant.workspace_id), file_id);
    let response = app.get(&download_uri, Some(&owner)).await;
    response.assert_ok();
    assert_eq!(response.text(), "hello world");
    let disposition = response
        .headers
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert_eq!(disposition, "attachment; filename=\"notes.txt\"");

    let delete_uri = format!("{}/{}", files_uri(&tenant.workspace_id), file_id);
    app.delete(&delete_uri, Some(&owner)).await.assert_no_content();
    app.get(&download_uri, Some(&owner)).await.assert_not_found();
    app.delete(&delete_uri, Some(&owner)).await.assert_not_found();

    let audit: Vec<Value> = app
        .get(
            &format!("/api/v1/audit-events/workspace/{}", tenant.workspace_id),
            Some(&owner),
        )
        .await
        .json();
    assert!(audit.iter().any(|e| e["event_type"] == "file.uploaded"));
    assert!(audit.iter().any(|e| e["event_type"] == "file.deleted"));
}

#[tokio::test]
async fn test_upload_validation() {
    let mut config = test_config();
    config.storage.max_upload_bytes = 8;
    let app = TestApp::with_config(config).await;
    let tenant = Tenant::create(&app, "Acme").await;
    let owner = app.token_for(&tenant.owner_id);

    upload(&app, &tenant.workspace_id, &owner, "empty.txt", b"")
        .await
        .assert_bad_request();
    upload(&app, &tenant.workspace_id, &owner, "", b"data")
        .await
        .assert_bad_request();

    let response = upload(
        &app,
        &tenant.workspace_id,
        &owner,
        "big.txt",
        b"more than eight bytes",
    )
    .await;
    assert_eq!(response.status, axum::http::StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_files_are_private_to_uploader() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    tenant.add_member(&app, ids::MEMBER, MembershipRole::Member).await;
    tenant.add_member(&app, ids::ADMIN, MembershipRole::Admin).await;
    let owner = app.token_for(&tenant.owner_id);
    let member = app.token_for(ids::MEMBER);
    let admin = app.token_for(ids::ADMIN);

    let file: Value = upload(&app, &tenant.workspace_id, &member, "mine.txt", b"secret")
        .await
        .json();
    let file_id = file["id"].as_str().unwrap();
    let download_uri = format!("{}/{}/download", files_uri(&tenant.workspace_id), file_id);
    let delete_uri = format!("{}/{}", files_uri(&tenant.workspace_id), file_id);

    // Other members neither see nor download it
    let listed: Vec<Value> = app
        .get(&files_uri(&tenant.workspace_id), Some(&owner))
        .await
        .json();
    assert!(listed.is_empty());
    app.get(&download_uri, Some(&owner)).await.assert_forbidden();

    // A workspace admin may delete it
    app.delete(&delete_uri, Some(&admin)).await.assert_no_content();
    app.get(&download_uri, Some(&member)).await.assert_not_found();
}

#[tokio::test]
async fn test_file_routes_are_workspace_scoped() {
    let app = TestApp::new().await;
    let tenant = Tenant::create(&app, "Acme").await;
    let other = app.create_workspace(ids::OWNER, "Other").await;
    let owner = app.token_for(&tenant.owner_id);

    let file: Value = upload(&app, &tenant.workspace_id, &owner, "a.txt", b"a")
        .await
        .json();
    let file_id = file["id"].as_str().unwrap();

    // Right owner, wrong workspace in the path
    app.get(
        &format!("{}/{}/download", files_uri(&other.id), file_id),
        Some(&owner),
    )
    .await
    .assert_forbidden();
    app.delete(&format!("{}/{}", files_uri(&other.id), file_id), Some(&owner))
        .await
        .assert_forbidden();

    // Non-members and lapsed subscriptions are stopped by the guard
    app.create_user(ids::OUTSIDER, &email_of(ids::OUTSIDER), false)
        .await;
    let outsider = app.token_for(ids::OUTSIDER);
    app.get(&files_uri(&tenant.workspace_id), Some(&outsider))
        .await
        .assert_forbidden();
    upload(&app, &tenant.workspace_id, &outsider, "x.txt", b"x")
        .await
        .assert_forbidden();

    app.set_subscription_status(&tenant.workspace_id, SubscriptionStatus::Cancelled)
        .await;
    app.get(&files_uri(&tenant.workspace_id), Some(&owner))
        .await
        .assert_forbidden();
}
