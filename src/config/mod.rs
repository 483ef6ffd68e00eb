//! Configuration management
//!
//! YAML configuration with:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default id of the single workspace guest tokens are scoped to
pub const DEFAULT_GUEST_WORKSPACE_ID: &str = "guest-demo-workspace-id";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub guest: GuestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub app: AppInfoConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://./data/workspace-hub.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Identity provider (member token) configuration.
///
/// Key sources are tried in order: `jwt_key` (PEM), `jwks_url`, `hs256_secret`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// Backend API secret, sent as a bearer credential when fetching JWKS
    #[serde(default)]
    pub secret_key: Option<String>,
    /// PEM-encoded RSA public key for networkless RS256 verification
    #[serde(default)]
    pub jwt_key: Option<String>,
    #[serde(default)]
    pub jwks_url: Option<String>,
    /// Shared HS256 secret, for development and tests
    #[serde(default)]
    pub hs256_secret: Option<String>,
    /// Expected `iss` claim, checked when set
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default = "default_jwks_cache_secs")]
    pub jwks_cache_secs: u64,
    /// Svix signing secret for identity-provider webhooks (`whsec_...`)
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

fn default_jwks_cache_secs() -> u64 {
    3600
}

impl IdentityConfig {
    pub fn has_key_source(&self) -> bool {
        [&self.jwt_key, &self.jwks_url, &self.hs256_secret]
            .iter()
            .any(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// Guest token configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuestConfig {
    #[serde(default = "default_guest_secret")]
    pub secret: String,
    #[serde(default = "default_guest_expiry")]
    pub expiry_seconds: u64,
    #[serde(default = "default_guest_workspace_id")]
    pub workspace_id: String,
}

fn default_guest_secret() -> String {
    "change-me-in-production-minimum-32-characters-long".to_string()
}

fn default_guest_expiry() -> u64 {
    3600
}

fn default_guest_workspace_id() -> String {
    DEFAULT_GUEST_WORKSPACE_ID.to_string()
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            secret: default_guest_secret(),
            expiry_seconds: default_guest_expiry(),
            workspace_id: default_guest_workspace_id(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log output target (console, file or both)
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target includes "file")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
    /// Maximum number of log files to keep (0 = unlimited)
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_prefix() -> String {
    "workspace-hub".to_string()
}

fn default_log_rotation() -> bool {
    true
}

fn default_max_log_files() -> usize {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
            max_log_files: default_max_log_files(),
        }
    }
}

/// Per-IP rate limiting of the public endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_burst_size() -> u32 {
    10
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// Public application details used in invitations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppInfoConfig {
    #[serde(default = "default_app_url")]
    pub url: String,
    #[serde(default = "default_app_name")]
    pub name: String,
}

fn default_app_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_app_name() -> String {
    "Workspace Hub".to_string()
}

impl Default for AppInfoConfig {
    fn default() -> Self {
        Self {
            url: default_app_url(),
            name: default_app_name(),
        }
    }
}

/// Where uploaded file content is kept
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    /// Process memory; content is lost on restart
    Memory,
}

/// File storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory of the local backend
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            identity: IdentityConfig {
                jwks_cache_secs: default_jwks_cache_secs(),
                ..Default::default()
            },
            guest: GuestConfig::default(),
            logging: LoggingConfig::default(),
            rate_limit: RateLimitSettings::default(),
            app: AppInfoConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("WORKSPACE_HUB_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                Self::from_file(path)?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a YAML configuration file without environment overrides
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/workspace-hub/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("workspace-hub/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Server
        if let Some(host) = var("WORKSPACE_HUB_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("WORKSPACE_HUB_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // Database
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = url;
        }

        // Identity provider
        if let Some(v) = var("CLERK_SECRET_KEY") {
            self.identity.secret_key = Some(v);
        }
        if let Some(v) = var("CLERK_JWT_KEY") {
            // PEM keys are commonly passed with escaped newlines
            self.identity.jwt_key = Some(v.replace("\\n", "\n"));
        }
        if let Some(v) = var("CLERK_JWKS_URL") {
            self.identity.jwks_url = Some(v);
        }
        if let Some(v) = var("CLERK_ISSUER") {
            self.identity.issuer = Some(v);
        }
        if let Some(v) = var("CLERK_WEBHOOK_SECRET") {
            self.identity.webhook_secret = Some(v);
        }
        if let Some(v) = var("IDENTITY_HS256_SECRET") {
            self.identity.hs256_secret = Some(v);
        }

        // Guest tokens
        if let Some(v) = var("GUEST_TOKEN_SECRET") {
            self.guest.secret = v;
        }
        if let Some(v) = var("GUEST_TOKEN_EXPIRY_SECONDS").and_then(|v| v.parse().ok()) {
            self.guest.expiry_seconds = v;
        }
        if let Some(v) = var("GUEST_WORKSPACE_ID") {
            self.guest.workspace_id = v;
        }

        // Logging
        if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = var("WORKSPACE_HUB_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        if let Some(target) = var("WORKSPACE_HUB_LOG_TARGET") {
            self.logging.target = match target.to_lowercase().as_str() {
                "file" => LogTarget::File,
                "both" => LogTarget::Both,
                _ => LogTarget::Console,
            };
        }
        if let Some(dir) = var("WORKSPACE_HUB_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }

        if let Some(url) = var("APP_URL") {
            self.app.url = url;
        }
        if let Some(name) = var("APP_NAME") {
            self.app.name = name;
        }

        // File storage
        if let Some(backend) = var("STORAGE_BACKEND") {
            self.storage.backend = match backend.to_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                _ => StorageBackend::Local,
            };
        }
        if let Some(dir) = var("UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(v) = var("MAX_UPLOAD_BYTES").and_then(|v| v.parse().ok()) {
            self.storage.max_upload_bytes = v;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.guest.secret.is_empty() {
            anyhow::bail!("Guest token secret cannot be empty");
        }
        if self.guest.secret.len() < 32 {
            tracing::warn!("Guest token secret is shorter than 32 characters");
        }
        if self.guest.expiry_seconds == 0 {
            anyhow::bail!("Guest token expiry must be greater than 0");
        }
        if self.guest.workspace_id.is_empty() {
            anyhow::bail!("Guest workspace id cannot be empty");
        }

        if self.storage.max_upload_bytes == 0 {
            anyhow::bail!("Maximum upload size must be greater than 0");
        }

        if !self.identity.has_key_source() {
            anyhow::bail!(
                "Identity provider needs one of identity.jwt_key, identity.jwks_url or identity.hs256_secret"
            );
        }

        Ok(())
    }

    /// Socket address string the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
