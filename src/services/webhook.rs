//! Identity-provider webhooks
//!
//! Deliveries are signed Svix-style: HMAC-SHA256 over `"{id}.{timestamp}.{body}"`
//! keyed with the base64 part of a `whsec_` secret, sent as space-separated
//! `v1,<base64>` entries.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{DbPool, UserRepository};
use crate::models::{CreateWorkspaceRequest, User};
use crate::services::audit::{events, record_event};
use crate::services::workspace::WorkspaceService;
use crate::utils::AppError;

/// Accepted clock skew between the signer and us, in seconds
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

const SECRET_PREFIX: &str = "whsec_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Webhook secret is not configured")]
    NotConfigured,
    #[error("Missing webhook signature headers")]
    MissingHeaders,
    #[error("Webhook timestamp outside tolerance")]
    StaleTimestamp,
    #[error("Invalid webhook signature")]
    BadSignature,
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

/// The three signature headers of a delivery
#[derive(Debug, Clone, Copy)]
pub struct SignatureHeaders<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
}

/// Check a delivery signature against `secret` at time `now` (unix seconds)
pub fn verify_signature(
    secret: &str,
    headers: &SignatureHeaders<'_>,
    body: &[u8],
    now: i64,
) -> Result<(), WebhookError> {
    if headers.id.is_empty() || headers.timestamp.is_empty() || headers.signature.is_empty() {
        return Err(WebhookError::MissingHeaders);
    }

    let timestamp: i64 = headers
        .timestamp
        .parse()
        .map_err(|_| WebhookError::StaleTimestamp)?;
    if (now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(WebhookError::StaleTimestamp);
    }

    let key = STANDARD
        .decode(secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret))
        .map_err(|_| WebhookError::NotConfigured)?;

    let matched = headers
        .signature
        .split_whitespace()
        .filter_map(|entry| entry.strip_prefix("v1,"))
        .filter_map(|sig| STANDARD.decode(sig).ok())
        .any(|expected| {
            let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&key) else {
                return false;
            };
            mac.update(headers.id.as_bytes());
            mac.update(b".");
            mac.update(headers.timestamp.as_bytes());
            mac.update(b".");
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        });

    if matched {
        Ok(())
    } else {
        Err(WebhookError::BadSignature)
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct IdentityUser {
    id: String,
    #[serde(default)]
    email_addresses: Vec<EmailAddress>,
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
}

impl IdentityUser {
    fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug, Deserialize)]
struct SessionData {
    user_id: String,
}

/// What a delivery did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    UserProvisioned { user_id: String },
    LoginRecorded { user_id: String },
    Ignored,
}

#[derive(Clone)]
pub struct WebhookService {
    db: DbPool,
    workspaces: WorkspaceService,
}

impl WebhookService {
    pub fn new(db: DbPool) -> Self {
        Self {
            workspaces: WorkspaceService::new(db.clone()),
            db,
        }
    }

    pub async fn handle(&self, event: WebhookEvent) -> Result<WebhookOutcome, AppError> {
        match event.event_type.as_str() {
            "user.created" => {
                let data: IdentityUser = serde_json::from_value(event.data)?;
                self.provision_user(data).await
            }
            "session.created" | "user.logged_in" => {
                let data: SessionData = serde_json::from_value(event.data)?;
                self.record_login(&data.user_id).await
            }
            other => {
                debug!(event_type = %other, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Mirror a new identity-provider user and give them a first workspace.
    ///
    /// Redeliveries are harmless: the workspace is only created while the
    /// user has no primary workspace.
    async fn provision_user(&self, data: IdentityUser) -> Result<WebhookOutcome, AppError> {
        let email = data
            .email_addresses
            .first()
            .map(|e| e.email_address.trim().to_string())
            .ok_or_else(|| AppError::bad_request("User has no email address"))?;
        let full_name = data.full_name();

        let users = UserRepository::new(&self.db);
        let user: User = users
            .upsert_from_identity(&data.id, &email, full_name.as_deref(), data.image_url.as_deref())
            .await?;

        if user.primary_workspace_id.is_none() {
            let name = match &full_name {
                Some(n) => format!("{}'s Workspace", n),
                None => "My Workspace".to_string(),
            };
            let workspace = self
                .workspaces
                .create(
                    &user.id,
                    &user.id,
                    &CreateWorkspaceRequest {
                        name,
                        slug: None,
                        owner_id: Some(user.id.clone()),
                        settings_json: None,
                    },
                )
                .await?;
            users.set_primary_workspace(&user.id, &workspace.id).await?;
        }

        info!(user_id = %user.id, "User provisioned from identity provider");
        record_event(
            &self.db,
            events::USER_CREATED,
            Some(&user.id),
            None,
            json!({ "email": email, "source": "webhook" }),
        )
        .await;

        Ok(WebhookOutcome::UserProvisioned { user_id: user.id })
    }

    async fn record_login(&self, user_id: &str) -> Result<WebhookOutcome, AppError> {
        if !UserRepository::new(&self.db).touch_last_login(user_id).await? {
            debug!(user_id = %user_id, "Login for unknown user");
            return Ok(WebhookOutcome::Ignored);
        }

        record_event(&self.db, events::USER_LOGGED_IN, Some(user_id), None, json!({})).await;
        Ok(WebhookOutcome::LoginRecorded {
            user_id: user_id.to_string(),
        })
    }
}

/// Current unix time, for [`verify_signature`]
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Sign a payload the way the identity provider does
pub fn sign_payload(secret: &str, id: &str, timestamp: i64, body: &[u8]) -> Option<String> {
    let key = STANDARD
        .decode(secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret))
        .ok()?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&key).ok()?;
    mac.update(format!("{}.{}.", id, timestamp).as_bytes());
    mac.update(body);
    Some(format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes())))
}
