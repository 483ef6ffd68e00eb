//! Member token verification against the identity provider
//!
//! Member tokens are issued by the external identity provider (Clerk) and
//! verified statelessly. Three key sources are supported, picked in this
//! order from configuration:
//!
//! 1. a PEM-encoded RSA public key (RS256, no network access),
//! 2. a JWKS endpoint (RS256, keys selected by `kid` and cached),
//! 3. a shared HS256 secret (development and tests).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{
    decode, decode_header,
    errors::ErrorKind,
    jwk::{Jwk, JwkSet},
    Algorithm, DecodingKey, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::IdentityConfig;

/// Clock skew tolerated on `exp`/`nbf`
const LEEWAY_SECS: u64 = 5;

/// Claims extracted from a verified member token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Every other claim, kept for callers that need provider metadata
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Why a member token was rejected. Logged server-side only.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token expired")]
    Expired,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token has no subject")]
    MissingSubject,
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
    #[error("no signing key for kid {0}")]
    UnknownKey(String),
    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::MissingRequiredClaim(claim) if claim == "sub" => TokenError::MissingSubject,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                TokenError::Malformed(err.to_string())
            }
            _ => TokenError::InvalidClaims(err.to_string()),
        }
    }
}

/// Stateless verification of identity-provider tokens
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, TokenError>;
}

/// Cached JWKS document
#[derive(Debug, Clone)]
struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

#[derive(Debug)]
struct JwksSource {
    url: String,
    secret_key: Option<String>,
    ttl: Duration,
    client: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
}

impl JwksSource {
    async fn key_for(&self, kid: &str) -> Result<DecodingKey, TokenError> {
        if let Some(jwk) = self.cached_key(kid).await {
            return decoding_key_from_jwk(&jwk);
        }

        // Cache miss, expiry or key rotation: refetch exactly once
        let keys = self.refresh().await?;
        let jwk = find_jwk(&keys, kid).ok_or_else(|| TokenError::UnknownKey(kid.to_string()))?;
        decoding_key_from_jwk(jwk)
    }

    async fn cached_key(&self, kid: &str) -> Option<Jwk> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        if cached.fetched_at.elapsed() > self.ttl {
            return None;
        }
        find_jwk(&cached.keys, kid).cloned()
    }

    async fn refresh(&self) -> Result<JwkSet, TokenError> {
        debug!(url = %self.url, "Fetching JWKS");

        let mut request = self.client.get(&self.url);
        if let Some(ref secret) = self.secret_key {
            request = request.bearer_auth(secret);
        }

        let keys: JwkSet = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TokenError::KeysUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| TokenError::KeysUnavailable(e.to_string()))?;

        *self.cache.write().await = Some(CachedJwks {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }
}

fn find_jwk<'a>(keys: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    keys.keys
        .iter()
        .find(|key| key.common.key_id.as_deref() == Some(kid))
}

fn decoding_key_from_jwk(jwk: &Jwk) -> Result<DecodingKey, TokenError> {
    DecodingKey::from_jwk(jwk).map_err(|e| TokenError::KeysUnavailable(e.to_string()))
}

#[derive(Debug)]
enum KeySource {
    Static {
        key: DecodingKey,
        algorithm: Algorithm,
    },
    Jwks(JwksSource),
}

/// [`IdentityVerifier`] for Clerk-issued session tokens
#[derive(Debug)]
pub struct ClerkVerifier {
    source: KeySource,
    issuer: Option<String>,
}

impl ClerkVerifier {
    /// Build a verifier from configuration, picking the first available key source
    pub fn from_config(config: &IdentityConfig) -> anyhow::Result<Self> {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());

        let source = if let Some(pem) = non_empty(&config.jwt_key) {
            KeySource::Static {
                key: DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Invalid identity.jwt_key: {}", e))?,
                algorithm: Algorithm::RS256,
            }
        } else if let Some(url) = non_empty(&config.jwks_url) {
            KeySource::Jwks(JwksSource {
                url,
                secret_key: non_empty(&config.secret_key),
                ttl: Duration::from_secs(config.jwks_cache_secs),
                client: reqwest::Client::builder()
                    .timeout(Duration::from_secs(10))
                    .build()?,
                cache: RwLock::new(None),
            })
        } else if let Some(secret) = non_empty(&config.hs256_secret) {
            KeySource::Static {
                key: DecodingKey::from_secret(secret.as_bytes()),
                algorithm: Algorithm::HS256,
            }
        } else {
            anyhow::bail!("No identity provider key configured");
        };

        Ok(Self {
            source,
            issuer: non_empty(&config.issuer),
        })
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = LEEWAY_SECS;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(ref issuer) = self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        validation
    }
}

#[async_trait]
impl IdentityVerifier for ClerkVerifier {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        let header = decode_header(token)?;

        let (key, algorithm) = match &self.source {
            KeySource::Static { key, algorithm } => (key.clone(), *algorithm),
            KeySource::Jwks(jwks) => {
                if header.alg != Algorithm::RS256 {
                    return Err(TokenError::Malformed(format!(
                        "unexpected algorithm {:?}",
                        header.alg
                    )));
                }
                let kid = header
                    .kid
                    .as_deref()
                    .ok_or_else(|| TokenError::Malformed("missing kid".to_string()))?;
                (jwks.key_for(kid).await?, Algorithm::RS256)
            }
        };

        let claims = decode::<IdentityClaims>(token, &key, &self.validation(algorithm))?.claims;

        if claims.sub.trim().is_empty() {
            return Err(TokenError::MissingSubject);
        }

        Ok(claims)
    }
}
