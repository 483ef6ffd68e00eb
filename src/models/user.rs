//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Platform user, mirrored from the identity provider.
///
/// `id` is the identity provider's subject claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_global_admin: bool,
    #[serde(default)]
    pub is_disabled: bool,
    pub primary_workspace_id: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255))]
    pub id: String,
    #[validate(email)]
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_global_admin: bool,
}

/// Request to update a user
///
/// `is_global_admin` and `is_disabled` may only be changed by a global admin.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email)]
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_global_admin: Option<bool>,
    pub is_disabled: Option<bool>,
}

impl UpdateUserRequest {
    /// Whether the request touches admin-only flags
    pub fn changes_privileges(&self) -> bool {
        self.is_global_admin.is_some() || self.is_disabled.is_some()
    }
}
