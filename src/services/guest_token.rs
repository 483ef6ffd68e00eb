//! Guest token lifecycle
//!
//! Guest tokens are HS256 JWTs signed with a local secret and scoped to the
//! single configured guest workspace. Each issued token is mirrored in the
//! `guest_tokens` table so it can be revoked, usage-counted and listed.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GuestConfig;
use crate::db::{DbPool, GuestTokenRepository};
use crate::models::{GuestClaims, GuestToken};
use crate::utils::AppError;

/// Outcome of checking a bearer string against the guest signing key
#[derive(Debug, Clone, PartialEq)]
pub enum GuestVerification {
    /// Not signed by us, or not shaped like a guest token
    NotAGuestToken,
    /// Signed by us but unusable (expired, missing claims)
    Invalid(String),
    Valid(GuestClaims),
}

#[derive(Debug, Error)]
pub enum GuestTokenError {
    #[error("Guest token not found")]
    NotFound,
    #[error("Guest token expired")]
    Expired,
    #[error("Guest token usage limit exceeded")]
    UsageExceeded,
    #[error("Guest token does not permit action: {0}")]
    ActionNotPermitted(String),
    #[error("Workspace ID mismatch for guest token")]
    WorkspaceMismatch,
    #[error("Failed to sign guest token: {0}")]
    Signing(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<GuestTokenError> for AppError {
    fn from(err: GuestTokenError) -> Self {
        match err {
            GuestTokenError::NotFound => AppError::NotFound(err.to_string()),
            GuestTokenError::Expired
            | GuestTokenError::UsageExceeded
            | GuestTokenError::ActionNotPermitted(_)
            | GuestTokenError::WorkspaceMismatch => AppError::Forbidden(err.to_string()),
            GuestTokenError::Signing(_) | GuestTokenError::Storage(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

pub type GuestTokenResult<T> = Result<T, GuestTokenError>;

pub struct GuestTokenService {
    pool: DbPool,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry: Duration,
    workspace_id: String,
}

impl GuestTokenService {
    pub fn new(pool: DbPool, config: &GuestConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            pool,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            expiry: Duration::seconds(config.expiry_seconds as i64),
            workspace_id: config.workspace_id.clone(),
        }
    }

    /// The only workspace guest tokens are ever scoped to
    pub fn guest_workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Check a bearer string against the guest signing key. Pure; never errors.
    pub fn verify(&self, token: &str) -> GuestVerification {
        let value = match decode::<serde_json::Value>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            // Only our own signature gets this far
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature) => {
                return GuestVerification::Invalid(e.to_string());
            }
            Err(e) => {
                debug!(reason = %e, "Bearer is not a guest token");
                return GuestVerification::NotAGuestToken;
            }
        };

        if value.get("guest") != Some(&json!(true)) {
            return GuestVerification::NotAGuestToken;
        }

        match value.get("workspaceId").and_then(|v| v.as_str()) {
            Some(ws) if !ws.is_empty() => {}
            _ => return GuestVerification::Invalid("missing workspaceId".to_string()),
        }

        match serde_json::from_value::<GuestClaims>(value) {
            Ok(claims) => GuestVerification::Valid(claims),
            Err(e) => GuestVerification::Invalid(e.to_string()),
        }
    }

    /// Issue a new token for the guest workspace
    pub async fn issue(&self) -> GuestTokenResult<String> {
        let token = self.mint(json!({ "guest": true }), None).await?;
        info!(workspace_id = %self.workspace_id, "Issued guest token");
        Ok(token)
    }

    async fn mint(
        &self,
        permissions: serde_json::Value,
        max_usage: Option<i64>,
    ) -> GuestTokenResult<String> {
        // Millisecond precision so the mirror row and the JWT agree after storage
        let now = Utc::now();
        let issued_at = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let expires_at = issued_at + self.expiry;

        let claims = GuestClaims {
            guest: true,
            workspace_id: self.workspace_id.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GuestTokenError::Signing(e.to_string()))?;

        GuestTokenRepository::new(&self.pool)
            .insert(&GuestToken {
                token: token.clone(),
                workspace_id: self.workspace_id.clone(),
                issued_at,
                expires_at,
                permissions,
                usage_count: 0,
                max_usage,
            })
            .await?;

        Ok(token)
    }

    /// Check the mirror row: present, unexpired, under its usage cap, and
    /// (when `action` is given) permitting that action.
    pub async fn validate(&self, token: &str, action: Option<&str>) -> GuestTokenResult<GuestToken> {
        self.validate_at(token, action, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        token: &str,
        action: Option<&str>,
        now: DateTime<Utc>,
    ) -> GuestTokenResult<GuestToken> {
        let record = GuestTokenRepository::new(&self.pool)
            .get(token)
            .await?
            .ok_or(GuestTokenError::NotFound)?;

        if record.is_expired_at(now) {
            return Err(GuestTokenError::Expired);
        }
        if record.usage_exhausted() {
            return Err(GuestTokenError::UsageExceeded);
        }
        if let Some(action) = action {
            if !record.permits(action) {
                return Err(GuestTokenError::ActionNotPermitted(action.to_string()));
            }
        }

        Ok(record)
    }

    pub async fn increment_usage(&self, token: &str) -> GuestTokenResult<()> {
        if !GuestTokenRepository::new(&self.pool)
            .increment_usage(token)
            .await?
        {
            return Err(GuestTokenError::NotFound);
        }
        Ok(())
    }

    /// Delete the mirror row. A second revoke reports `NotFound`.
    pub async fn revoke(&self, token: &str) -> GuestTokenResult<()> {
        if !GuestTokenRepository::new(&self.pool).delete(token).await? {
            return Err(GuestTokenError::NotFound);
        }
        info!("Revoked guest token");
        Ok(())
    }

    /// Replace `old_token` with a fresh token carrying the same permissions
    /// and usage cap. The old row is gone even if the workspace check fails.
    pub async fn refresh(&self, old_token: &str, workspace_id: &str) -> GuestTokenResult<String> {
        let old = self.validate(old_token, None).await?;

        let repo = GuestTokenRepository::new(&self.pool);
        if !repo.delete(old_token).await? {
            return Err(GuestTokenError::NotFound);
        }

        if old.workspace_id != workspace_id {
            warn!(
                token_workspace = %old.workspace_id,
                requested_workspace = %workspace_id,
                "Guest token refresh for a different workspace"
            );
            return Err(GuestTokenError::WorkspaceMismatch);
        }

        let token = self.mint(old.permissions, old.max_usage).await?;
        info!(workspace_id = %workspace_id, "Refreshed guest token");
        Ok(token)
    }

    /// Unexpired tokens of the guest workspace
    pub async fn list_active(&self) -> GuestTokenResult<Vec<GuestToken>> {
        Ok(GuestTokenRepository::new(&self.pool)
            .list_active(&self.workspace_id, Utc::now())
            .await?)
    }
}
