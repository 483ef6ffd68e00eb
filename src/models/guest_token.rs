//! Guest token models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by a guest JWT
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuestClaims {
    pub guest: bool,
    #[serde(rename = "workspaceId")]
    pub workspace_id: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Server-side mirror of an issued guest JWT, keyed by the token itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestToken {
    pub token: String,
    pub workspace_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub permissions: serde_json::Value,
    pub usage_count: i64,
    pub max_usage: Option<i64>,
}

impl GuestToken {
    /// Expired once `now` reaches `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn usage_exhausted(&self) -> bool {
        matches!(self.max_usage, Some(max) if self.usage_count >= max)
    }

    /// Whether the permission bag holds a truthy entry for `action`
    pub fn permits(&self, action: &str) -> bool {
        match self.permissions.get(action) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshGuestTokenRequest {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevokeGuestTokenResponse {
    pub revoked: bool,
}
