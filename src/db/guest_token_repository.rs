//! Guest token mirror repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{format_timestamp, parse_db_timestamp};
use crate::models::GuestToken;

#[derive(Debug, sqlx::FromRow)]
struct GuestTokenRow {
    token: String,
    workspace_id: String,
    issued_at: String,
    expires_at: String,
    permissions: Option<String>,
    usage_count: i64,
    max_usage: Option<i64>,
}

pub struct GuestTokenRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> GuestTokenRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, token: &GuestToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO guest_tokens (token, workspace_id, issued_at, expires_at, permissions, usage_count, max_usage)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token.token)
        .bind(&token.workspace_id)
        .bind(format_timestamp(token.issued_at))
        .bind(format_timestamp(token.expires_at))
        .bind(token.permissions.to_string())
        .bind(token.usage_count)
        .bind(token.max_usage)
        .execute(self.pool)
        .await
        .context("Failed to store guest token")?;

        Ok(())
    }

    pub async fn get(&self, token: &str) -> Result<Option<GuestToken>> {
        let row = sqlx::query_as::<_, GuestTokenRow>(
            r#"
            SELECT token, workspace_id, issued_at, expires_at, permissions, usage_count, max_usage
            FROM guest_tokens
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(self.pool)
        .await
        .context("Failed to get guest token")?;

        Ok(row.map(row_to_guest_token))
    }

    /// Tokens of a workspace that have not expired at `now`
    pub async fn list_active(
        &self,
        workspace_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<GuestToken>> {
        let rows = sqlx::query_as::<_, GuestTokenRow>(
            r#"
            SELECT token, workspace_id, issued_at, expires_at, permissions, usage_count, max_usage
            FROM guest_tokens
            WHERE workspace_id = ? AND expires_at > ?
            ORDER BY issued_at DESC
            "#,
        )
        .bind(workspace_id)
        .bind(format_timestamp(now))
        .fetch_all(self.pool)
        .await
        .context("Failed to list guest tokens")?;

        Ok(rows.into_iter().map(row_to_guest_token).collect())
    }

    /// Atomically bump the usage counter; `false` if the row is gone
    pub async fn increment_usage(&self, token: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE guest_tokens SET usage_count = usage_count + 1 WHERE token = ?")
                .bind(token)
                .execute(self.pool)
                .await
                .context("Failed to increment guest token usage")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM guest_tokens WHERE token = ?")
            .bind(token)
            .execute(self.pool)
            .await
            .context("Failed to delete guest token")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_guest_token(row: GuestTokenRow) -> GuestToken {
    GuestToken {
        token: row.token,
        workspace_id: row.workspace_id,
        issued_at: parse_db_timestamp(&row.issued_at),
        expires_at: parse_db_timestamp(&row.expires_at),
        permissions: row
            .permissions
            .and_then(|p| serde_json::from_str(&p).ok())
            .unwrap_or_else(|| serde_json::json!({})),
        usage_count: row.usage_count,
        max_usage: row.max_usage,
    }
}
