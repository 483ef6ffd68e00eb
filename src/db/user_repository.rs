//! User repository

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::{now_timestamp, parse_db_timestamp, parse_optional_timestamp};
use crate::models::{CreateUserRequest, UpdateUserRequest, User};

const USER_COLUMNS: &str = "id, email, full_name, avatar_url, is_global_admin, is_disabled, \
     primary_workspace_id, last_login_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    full_name: Option<String>,
    avatar_url: Option<String>,
    is_global_admin: bool,
    is_disabled: bool,
    primary_workspace_id: Option<String>,
    last_login_at: Option<String>,
    created_at: String,
    updated_at: String,
}

/// Privilege flags consulted when resolving a member principal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct UserFlags {
    pub is_global_admin: bool,
    pub is_disabled: bool,
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at", USER_COLUMNS);
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(self.pool)
            .await
            .context("Failed to list users")?;

        Ok(rows.into_iter().map(row_to_user).collect())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .context("Failed to get user")?;

        Ok(row.map(row_to_user))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE lower(email) = lower(?)",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await
            .context("Failed to get user by email")?;

        Ok(row.map(row_to_user))
    }

    /// Admin/disabled flags; `None` when the user has no row yet
    pub async fn get_flags(&self, id: &str) -> Result<Option<UserFlags>> {
        sqlx::query_as::<_, UserFlags>(
            "SELECT is_global_admin, is_disabled FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .context("Failed to get user flags")
    }

    pub async fn create(&self, req: &CreateUserRequest) -> Result<User> {
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, avatar_url, is_global_admin, is_disabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&req.id)
        .bind(&req.email)
        .bind(&req.full_name)
        .bind(&req.avatar_url)
        .bind(req.is_global_admin)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await
        .context("Failed to create user")?;

        self.get_by_id(&req.id)
            .await?
            .context("Failed to retrieve created user")
    }

    /// Insert or refresh a user from identity-provider data.
    ///
    /// Privilege flags and the primary workspace are left untouched on update.
    pub async fn upsert_from_identity(
        &self,
        id: &str,
        email: &str,
        full_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<User> {
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, avatar_url, is_global_admin, is_disabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, 0, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                full_name = excluded.full_name,
                avatar_url = excluded.avatar_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(full_name)
        .bind(avatar_url)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await
        .context("Failed to upsert user")?;

        self.get_by_id(id)
            .await?
            .context("Failed to retrieve upserted user")
    }

    pub async fn update(&self, id: &str, req: &UpdateUserRequest) -> Result<Option<User>> {
        let Some(existing) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let email = req.email.clone().unwrap_or(existing.email);
        let full_name = req.full_name.clone().or(existing.full_name);
        let avatar_url = req.avatar_url.clone().or(existing.avatar_url);
        let is_global_admin = req.is_global_admin.unwrap_or(existing.is_global_admin);
        let is_disabled = req.is_disabled.unwrap_or(existing.is_disabled);

        sqlx::query(
            r#"
            UPDATE users
            SET email = ?, full_name = ?, avatar_url = ?, is_global_admin = ?, is_disabled = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&email)
        .bind(&full_name)
        .bind(&avatar_url)
        .bind(is_global_admin)
        .bind(is_disabled)
        .bind(now_timestamp())
        .bind(id)
        .execute(self.pool)
        .await
        .context("Failed to update user")?;

        self.get_by_id(id).await
    }

    pub async fn set_primary_workspace(&self, id: &str, workspace_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET primary_workspace_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(workspace_id)
        .bind(now_timestamp())
        .bind(id)
        .execute(self.pool)
        .await
        .context("Failed to set primary workspace")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_login(&self, id: &str) -> Result<bool> {
        let now = now_timestamp();
        let result = sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(self.pool)
            .await
            .context("Failed to record last login")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .context("Failed to delete user")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_user(row: UserRow) -> User {
    User {
        id: row.id,
        email: row.email,
        full_name: row.full_name,
        avatar_url: row.avatar_url,
        is_global_admin: row.is_global_admin,
        is_disabled: row.is_disabled,
        primary_workspace_id: row.primary_workspace_id,
        last_login_at: parse_optional_timestamp(row.last_login_at.as_deref()),
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
