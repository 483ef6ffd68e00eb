//! Audit event models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub event_type: String,
    pub actor_id: Option<String>,
    pub workspace_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuditEventRequest {
    #[serde(alias = "event_type")]
    pub event_type: String,
    #[serde(alias = "actor_id")]
    pub actor_id: Option<String>,
    #[serde(alias = "workspace_id")]
    pub workspace_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventQuery {
    pub event_type: Option<String>,
    pub actor_id: Option<String>,
    pub workspace_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
