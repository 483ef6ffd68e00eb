//! Workspace (tenant) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::MembershipRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub settings_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A workspace as seen by one of its members
#[derive(Debug, Clone, Serialize)]
pub struct UserWorkspace {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub role: MembershipRole,
    pub is_primary: bool,
}

/// A pending invitation as seen by the invitee
#[derive(Debug, Clone, Serialize)]
pub struct PendingInvite {
    pub workspace_id: String,
    pub workspace_name: String,
    pub workspace_slug: String,
    pub role: MembershipRole,
    pub invited_by: Option<String>,
    pub invited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWorkspaceRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Preferred slug; derived from `name` when absent
    pub slug: Option<String>,
    pub owner_id: Option<String>,
    pub settings_json: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateWorkspaceRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub slug: Option<String>,
    pub settings_json: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlugAvailability {
    pub slug: String,
    pub available: bool,
}
