//! Workspace Hub Library
//!
//! Multi-tenant workspace backend: users, workspaces, role-based membership,
//! subscription state, guest access, notifications, workspace files and audit
//! logging behind a guarded REST API.

use std::sync::Arc;

use anyhow::Result;

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{Guard, GuardRejection, RequestContext};
use services::{storage, ClerkVerifier, FileStorage, GuestTokenService, IdentityVerifier};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Member token verifier
    pub identity: Arc<dyn IdentityVerifier>,
    /// Guest token lifecycle
    pub guest_tokens: Arc<GuestTokenService>,
    /// Content store behind workspace files
    pub storage: Arc<dyn FileStorage>,
}

impl AppState {
    /// Build the state with the identity verifier described by `config`
    pub fn new(config: AppConfig, db: DbPool) -> Result<Self> {
        let identity = Arc::new(ClerkVerifier::from_config(&config.identity)?);
        Ok(Self::with_identity(config, db, identity))
    }

    /// Build the state around an already constructed verifier
    pub fn with_identity(
        config: AppConfig,
        db: DbPool,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let guest_tokens = Arc::new(GuestTokenService::new(db.clone(), &config.guest));
        let storage = storage::from_config(&config.storage, &config.app);
        Self {
            config,
            db,
            identity,
            guest_tokens,
            storage,
        }
    }
}
