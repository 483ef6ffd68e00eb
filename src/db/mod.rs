//! Database layer
//!
//! SQLite storage for users, workspaces, memberships, subscriptions,
//! guest-token mirrors, audit events, notifications and file metadata. Each
//! table has a repository that borrows the pool; statements that must share a
//! transaction take a `&mut SqliteConnection` instead.

pub mod audit_repository;
pub mod file_repository;
pub mod guest_token_repository;
pub mod membership_repository;
pub mod migrations;
pub mod notification_repository;
pub mod subscription_repository;
pub mod user_repository;
pub mod workspace_repository;

pub use audit_repository::AuditRepository;
pub use file_repository::FileRepository;
pub use guest_token_repository::GuestTokenRepository;
pub use membership_repository::MembershipRepository;
pub use notification_repository::NotificationRepository;
pub use subscription_repository::SubscriptionRepository;
pub use user_repository::UserRepository;
pub use workspace_repository::WorkspaceRepository;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteConnectOptions, Pool, Sqlite};
use std::str::FromStr;

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool and run migrations
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    migrations::run(&pool).await?;

    Ok(pool)
}

/// Timestamps are stored as RFC 3339 text with millisecond precision, which
/// keeps lexical and chronological order identical.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub(crate) fn parse_db_timestamp(ts: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
    }
    Utc::now()
}

pub(crate) fn parse_optional_timestamp(ts: Option<&str>) -> Option<DateTime<Utc>> {
    ts.map(parse_db_timestamp)
}
