//! Test fixtures for common test data
//!
//! A tenant is a workspace with its owner, ready for guarded requests.

use workspace_hub::models::MembershipRole;

use super::TestApp;

/// Stable ids used across tests
pub mod ids {
    pub const OWNER: &str = "user_owner";
    pub const ADMIN: &str = "user_admin";
    pub const MEMBER: &str = "user_member";
    pub const OUTSIDER: &str = "user_outsider";
    pub const GLOBAL_ADMIN: &str = "user_global_admin";
}

pub fn email_of(user_id: &str) -> String {
    format!("{}@example.com", user_id)
}

/// Workspace with an OWNER and its user ids
pub struct Tenant {
    pub workspace_id: String,
    pub owner_id: String,
}

impl Tenant {
    /// Owner plus a workspace with an active free subscription
    pub async fn create(app: &TestApp, name: &str) -> Self {
        app.create_user(ids::OWNER, &email_of(ids::OWNER), false).await;
        let workspace = app.create_workspace(ids::OWNER, name).await;
        Self {
            workspace_id: workspace.id,
            owner_id: ids::OWNER.to_string(),
        }
    }

    /// Create `user_id` and make them an active member with `role`
    pub async fn add_member(&self, app: &TestApp, user_id: &str, role: MembershipRole) {
        app.create_user(user_id, &email_of(user_id), false).await;
        app.add_member(&self.workspace_id, user_id, role).await;
    }

    pub fn members_uri(&self) -> String {
        format!("/api/v1/user-workspaces/{}/members", self.workspace_id)
    }
}
