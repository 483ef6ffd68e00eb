//! Database migrations
//!
//! Migrations live in the `migrations/` directory and are embedded at build
//! time.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Apply all pending migrations
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(())
}

/// Connectivity check used by the readiness endpoint
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Database ping failed")?;
    Ok(())
}
