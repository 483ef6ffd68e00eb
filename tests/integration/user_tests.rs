//! User record access and admin management

use serde_json::{json, Value};

use crate::common::{email_of, ids, TestApp};

#[tokio::test]
async fn test_user_visibility() {
    let app = TestApp::new().await;
    app.create_user(ids::MEMBER, &email_of(ids::MEMBER), false)
        .await;
    app.create_user(ids::OUTSIDER, &email_of(ids::OUTSIDER), false)
        .await;
    app.create_user(ids::GLOBAL_ADMIN, &email_of(ids::GLOBAL_ADMIN), true)
        .await;
    let member = app.token_for(ids::MEMBER);
    let admin = app.token_for(ids::GLOBAL_ADMIN);

    let response = app
        .get(&format!("/api/v1/users/{}", ids::MEMBER), Some(&member))
        .await;
    response.assert_ok();
    assert_eq!(response.json::<Value>()["email"], email_of(ids::MEMBER).as_str());

    app.get(&format!("/api/v1/users/{}", ids::OUTSIDER), Some(&member))
        .await
        .assert_forbidden();
    app.get(&format!("/api/v1/users/{}", ids::OUTSIDER), Some(&admin))
        .await
        .assert_ok();
    app.get("/api/v1/users/user_missing", Some(&admin))
        .await
        .assert_not_found();
}

#[tokio::test]
async fn test_privilege_flags_need_admin() {
    let app = TestApp::new().await;
    app.create_user(ids::MEMBER, &email_of(ids::MEMBER), false)
        .await;
    let member = app.token_for(ids::MEMBER);
    let uri = format!("/api/v1/users/{}", ids::MEMBER);

    app.patch_json(&uri, Some(&member), json!({ "is_global_admin": true }))
        .await
        .assert_forbidden();

    let response = app
        .patch_json(&uri, Some(&member), json!({ "full_name": "Jane Doe" }))
        .await;
    response.assert_ok();
    let user: Value = response.json();
    assert_eq!(user["full_name"], "Jane Doe");
    assert_eq!(user["is_global_admin"], false);
}

#[tokio::test]
async fn test_admin_create_and_delete() {
    let app = TestApp::new().await;
    app.create_user(ids::GLOBAL_ADMIN, &email_of(ids::GLOBAL_ADMIN), true)
        .await;
    let admin = app.token_for(ids::GLOBAL_ADMIN);

    let response = app
        .post_json(
            "/api/v1/users",
            Some(&admin),
            json!({ "id": "user_new", "email": "new@example.com" }),
        )
        .await;
    response.assert_created();
    assert_eq!(response.json::<Value>()["id"], "user_new");

    app.post_json(
        "/api/v1/users",
        Some(&admin),
        json!({ "id": "user_dup", "email": "new@example.com" }),
    )
    .await
    .assert_status(axum::http::StatusCode::CONFLICT);

    app.post_json(
        "/api/v1/users",
        Some(&admin),
        json!({ "id": "user_bad", "email": "not-an-email" }),
    )
    .await
    .assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);

    app.delete("/api/v1/users/user_new", Some(&admin))
        .await
        .assert_no_content();
    app.delete("/api/v1/users/user_new", Some(&admin))
        .await
        .assert_not_found();
}
