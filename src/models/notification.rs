//! Notification models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel used when nothing else is requested
pub const IN_APP_CHANNEL: &str = "in_app";
pub const EMAIL_CHANNEL: &str = "email";

/// Notification types raised by the service itself
pub mod notification_kinds {
    pub const WORKSPACE_INVITE: &str = "workspace-invite";
    pub const PLATFORM_INVITE: &str = "platform-invite";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Option<serde_json::Value>,
    pub sent_via: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub dismissed_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Row to store; ids and timestamps are assigned on insert
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Option<String>,
    pub kind: String,
    pub payload: Option<serde_json::Value>,
    pub sent_via: String,
}

/// Admin send body
#[derive(Debug, Clone, Deserialize)]
pub struct SendNotificationRequest {
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Option<serde_json::Value>,
    #[serde(alias = "sentVia")]
    pub sent_via: Option<String>,
    /// Delivery address for the email channel; never stored
    #[serde(rename = "toEmail", alias = "to_email")]
    pub to_email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}
