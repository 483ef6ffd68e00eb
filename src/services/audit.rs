//! Audit trail helper
//!
//! Services record events through [`record_event`]. A failed write is
//! logged and swallowed so auditing never fails the operation it describes.

use serde_json::Value;
use tracing::{info, warn};

use crate::db::{AuditRepository, DbPool};

pub mod events {
    pub const USER_CREATED: &str = "user.created";
    pub const USER_LOGGED_IN: &str = "user.logged_in";
    pub const USER_UPDATED: &str = "user.updated";
    pub const USER_DELETED: &str = "user.deleted";
    pub const WORKSPACE_CREATED: &str = "workspace.created";
    pub const WORKSPACE_UPDATED: &str = "workspace.updated";
    pub const WORKSPACE_DELETED: &str = "workspace.deleted";
    pub const PRIMARY_WORKSPACE_SET: &str = "user.primary_workspace_set";
    pub const MEMBER_INVITED: &str = "membership.invited";
    pub const PLATFORM_INVITE: &str = "membership.platform_invite";
    pub const MEMBER_ACCEPTED: &str = "membership.accepted";
    pub const MEMBER_DECLINED: &str = "membership.declined";
    pub const MEMBER_REMOVED: &str = "membership.removed";
    pub const MEMBER_LEFT: &str = "membership.left";
    pub const MEMBER_ROLE_UPDATED: &str = "membership.role_updated";
    pub const SUBSCRIPTION_UPDATED: &str = "subscription.updated";
    pub const NOTIFICATION_SENT: &str = "notification.sent";
    pub const FILE_UPLOADED: &str = "file.uploaded";
    pub const FILE_DELETED: &str = "file.deleted";
}

pub async fn record_event(
    pool: &DbPool,
    event_type: &str,
    actor_id: Option<&str>,
    workspace_id: Option<&str>,
    details: Value,
) {
    info!(
        event_type = event_type,
        actor_id = actor_id.unwrap_or("-"),
        workspace_id = workspace_id.unwrap_or("-"),
        "Audit event"
    );

    let details = (!details.is_null()).then_some(details);
    if let Err(error) = AuditRepository::new(pool)
        .insert(event_type, actor_id, workspace_id, details.as_ref())
        .await
    {
        warn!(error = ?error, event_type = event_type, "Failed to record audit event");
    }
}
