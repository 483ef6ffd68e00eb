//! Test application setup utilities
//!
//! Builds the full router over a fresh temp-file SQLite database. Member
//! tokens are HS256-signed with [`TEST_IDENTITY_SECRET`].

use axum::{body::Body, http::Request, Router};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use workspace_hub::{
    api,
    config::{AppConfig, StorageBackend},
    db::{self, membership_repository, SubscriptionRepository, UserRepository},
    models::{
        CreateUserRequest, CreateWorkspaceRequest, MembershipRole, SubscriptionStatus,
        UpdateUserRequest, User, Workspace,
    },
    services::WorkspaceService,
    AppState,
};

pub const TEST_IDENTITY_SECRET: &str = "identity-test-secret-that-is-long-enough";
pub const TEST_GUEST_SECRET: &str = "guest-test-secret-that-is-at-least-32-chars";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_c2VjcmV0LWtleS1mb3ItdGVzdHM=";
pub const TEST_GUEST_WORKSPACE_ID: &str = "guest-demo-workspace-id";

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Create a new test application with a temp-file SQLite database
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Create a new test application with custom configuration
    pub async fn with_config(config: AppConfig) -> Self {
        let db = db::init_pool(&config.database.url, config.database.max_connections)
            .await
            .expect("Failed to initialize test database");

        WorkspaceService::new(db.clone())
            .ensure_guest_workspace(&config.guest.workspace_id)
            .await
            .expect("Failed to create guest workspace");

        let state = AppState::new(config, db).expect("Failed to build app state");

        let router = Router::new()
            .nest("/api/v1", api::public_routes())
            .nest("/api/v1", api::protected_routes(&state))
            .with_state(state.clone());

        Self { router, state }
    }

    /// Mint a member token for `user_id`
    pub fn token_for(&self, user_id: &str) -> String {
        member_token(user_id, Utc::now().timestamp() + 3600)
    }

    /// Insert a user row
    pub async fn create_user(&self, id: &str, email: &str, is_global_admin: bool) -> User {
        UserRepository::new(&self.state.db)
            .create(&CreateUserRequest {
                id: id.to_string(),
                email: email.to_string(),
                full_name: None,
                avatar_url: None,
                is_global_admin,
            })
            .await
            .expect("Failed to create user")
    }

    pub async fn disable_user(&self, id: &str) {
        UserRepository::new(&self.state.db)
            .update(
                id,
                &UpdateUserRequest {
                    is_disabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to disable user");
    }

    /// Workspace owned by `owner_id` with an active free subscription
    pub async fn create_workspace(&self, owner_id: &str, name: &str) -> Workspace {
        WorkspaceService::new(self.state.db.clone())
            .create(
                owner_id,
                owner_id,
                &CreateWorkspaceRequest {
                    name: name.to_string(),
                    slug: None,
                    owner_id: None,
                    settings_json: None,
                },
            )
            .await
            .expect("Failed to create workspace")
    }

    /// Add an active membership directly
    pub async fn add_member(&self, workspace_id: &str, user_id: &str, role: MembershipRole) {
        let mut conn = self
            .state
            .db
            .acquire()
            .await
            .expect("Failed to acquire connection");
        membership_repository::insert_active(&mut *conn, user_id, workspace_id, role)
            .await
            .expect("Failed to add member");
    }

    pub async fn set_subscription_status(&self, workspace_id: &str, status: SubscriptionStatus) {
        SubscriptionRepository::new(&self.state.db)
            .set_status(workspace_id, status)
            .await
            .expect("Failed to set subscription status")
            .expect("Subscription missing");
    }

    /// Active OWNER/ADMIN count of a workspace
    pub async fn privileged_count(&self, workspace_id: &str) -> i64 {
        let mut conn = self
            .state
            .db
            .acquire()
            .await
            .expect("Failed to acquire connection");
        membership_repository::count_active_admins(&mut *conn, workspace_id, None)
            .await
            .expect("Failed to count admins")
    }

    /// Make a GET request
    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send("GET", uri, token, None).await
    }

    /// Make a POST request with JSON body
    pub async fn post_json(
        &self,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> TestResponse {
        self.send("POST", uri, token, Some(body)).await
    }

    /// Make a PATCH request with JSON body
    pub async fn patch_json(
        &self,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> TestResponse {
        self.send("PATCH", uri, token, Some(body)).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send("DELETE", uri, token, None).await
    }

    /// Issue a guest token through the public endpoint
    pub async fn issue_guest_token(&self) -> String {
        let response = self
            .send("POST", "/api/v1/guest-tokens/issue", None, Some(json!({})))
            .await;
        response.assert_created();
        response.text()
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.request(builder.body(body).unwrap()).await
    }

    /// Make an arbitrary request
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: axum::http::StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse response as JSON")
    }

    /// Assert the response status
    pub fn assert_status(&self, expected: axum::http::StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::OK)
    }

    pub fn assert_created(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::CREATED)
    }

    pub fn assert_no_content(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::NO_CONTENT)
    }

    pub fn assert_bad_request(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::BAD_REQUEST)
    }

    pub fn assert_unauthorized(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::UNAUTHORIZED)
    }

    pub fn assert_forbidden(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::FORBIDDEN)
    }

    pub fn assert_not_found(&self) -> &Self {
        self.assert_status(axum::http::StatusCode::NOT_FOUND)
    }
}

/// Create a test configuration with a temporary SQLite database
pub fn test_config() -> AppConfig {
    // Unique file per test so tests never share state
    let db_path = std::env::temp_dir().join(format!(
        "workspace_hub_test_{}.db",
        Uuid::new_v4().simple()
    ));

    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}?mode=rwc", db_path.display());
    config.database.max_connections = 4;
    config.identity.hs256_secret = Some(TEST_IDENTITY_SECRET.to_string());
    config.identity.webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());
    config.guest.secret = TEST_GUEST_SECRET.to_string();
    config.guest.workspace_id = TEST_GUEST_WORKSPACE_ID.to_string();
    config.rate_limit.enabled = false;
    config.storage.backend = StorageBackend::Memory;
    config
}

/// HS256 member token the test verifier accepts
pub fn member_token(user_id: &str, exp: i64) -> String {
    let claims = json!({
        "sub": user_id,
        "email": format!("{}@example.com", user_id),
        "iat": Utc::now().timestamp(),
        "exp": exp,
    });

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_IDENTITY_SECRET.as_bytes()),
    )
    .expect("Failed to generate test token")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_bootstraps_guest_workspace() {
        let app = TestApp::new().await;
        let response = app.get("/api/v1/health/ready", None).await;
        response.assert_ok();

        let workspace = workspace_hub::db::WorkspaceRepository::new(&app.state.db)
            .get_by_id(TEST_GUEST_WORKSPACE_ID)
            .await
            .unwrap();
        assert!(workspace.is_some());
    }
}
