//! Workspace repository

use anyhow::{Context, Result};
use sqlx::{SqliteConnection, SqlitePool};

use super::{now_timestamp, parse_db_timestamp, parse_optional_timestamp};
use crate::models::{MembershipRole, PendingInvite, UserWorkspace, Workspace};

#[derive(Debug, sqlx::FromRow)]
struct WorkspaceRow {
    id: String,
    slug: String,
    name: String,
    owner_id: Option<String>,
    settings_json: String,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct UserWorkspaceRow {
    #[sqlx(flatten)]
    workspace: WorkspaceRow,
    role: String,
    is_primary: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct PendingInviteRow {
    workspace_id: String,
    workspace_name: String,
    workspace_slug: String,
    role: String,
    invited_by: Option<String>,
    invited_at: String,
}

/// Values for a new workspace row
#[derive(Debug, Clone)]
pub struct NewWorkspace<'r> {
    pub id: &'r str,
    pub slug: &'r str,
    pub name: &'r str,
    pub owner_id: Option<&'r str>,
    pub settings_json: &'r serde_json::Value,
}

pub struct WorkspaceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> WorkspaceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Workspace>> {
        let rows = sqlx::query_as::<_, WorkspaceRow>(
            r#"
            SELECT id, slug, name, owner_id, settings_json, created_at, updated_at, deleted_at
            FROM workspaces
            WHERE deleted_at IS NULL
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool)
        .await
        .context("Failed to list workspaces")?;

        Ok(rows.into_iter().map(row_to_workspace).collect())
    }

    /// Live (not soft-deleted) workspace by id
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Workspace>> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            r#"
            SELECT id, slug, name, owner_id, settings_json, created_at, updated_at, deleted_at
            FROM workspaces
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .context("Failed to get workspace")?;

        Ok(row.map(row_to_workspace))
    }

    /// Slugs stay reserved by soft-deleted workspaces too
    pub async fn slug_exists(&self, slug: &str, excluding_id: Option<&str>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM workspaces WHERE slug = ? AND (? IS NULL OR id <> ?)",
        )
        .bind(slug)
        .bind(excluding_id)
        .bind(excluding_id)
        .fetch_one(self.pool)
        .await
        .context("Failed to check slug")?;

        Ok(count > 0)
    }

    /// Workspaces where the user is an active member
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserWorkspace>> {
        let rows = sqlx::query_as::<_, UserWorkspaceRow>(
            r#"
            SELECT w.id, w.slug, w.name, w.owner_id, w.settings_json, w.created_at, w.updated_at,
                   w.deleted_at, m.role,
                   COALESCE(u.primary_workspace_id = w.id, 0) AS is_primary
            FROM memberships m
            JOIN workspaces w ON w.id = m.workspace_id
            LEFT JOIN users u ON u.id = m.user_id
            WHERE m.user_id = ? AND m.status = 'active' AND w.deleted_at IS NULL
            ORDER BY w.name
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await
        .context("Failed to list workspaces for user")?;

        Ok(rows
            .into_iter()
            .map(|row| UserWorkspace {
                role: row.role.parse().unwrap_or(MembershipRole::Member),
                is_primary: row.is_primary,
                workspace: row_to_workspace(row.workspace),
            })
            .collect())
    }

    pub async fn list_pending_invites(&self, user_id: &str) -> Result<Vec<PendingInvite>> {
        let rows = sqlx::query_as::<_, PendingInviteRow>(
            r#"
            SELECT w.id AS workspace_id, w.name AS workspace_name, w.slug AS workspace_slug,
                   m.role, m.invited_by, m.updated_at AS invited_at
            FROM memberships m
            JOIN workspaces w ON w.id = m.workspace_id
            WHERE m.user_id = ? AND m.status = 'pending' AND w.deleted_at IS NULL
            ORDER BY m.updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await
        .context("Failed to list pending invites")?;

        Ok(rows
            .into_iter()
            .map(|row| PendingInvite {
                workspace_id: row.workspace_id,
                workspace_name: row.workspace_name,
                workspace_slug: row.workspace_slug,
                role: row.role.parse().unwrap_or(MembershipRole::Member),
                invited_by: row.invited_by,
                invited_at: parse_db_timestamp(&row.invited_at),
            })
            .collect())
    }

    pub async fn update(
        &self,
        id: &str,
        name: &str,
        slug: &str,
        settings_json: &serde_json::Value,
    ) -> Result<Option<Workspace>> {
        let result = sqlx::query(
            r#"
            UPDATE workspaces
            SET name = ?, slug = ?, settings_json = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(name)
        .bind(slug)
        .bind(settings_json.to_string())
        .bind(now_timestamp())
        .bind(id)
        .execute(self.pool)
        .await
        .context("Failed to update workspace")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        let now = now_timestamp();
        let result = sqlx::query(
            "UPDATE workspaces SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await
        .context("Failed to delete workspace")?;

        Ok(result.rows_affected() > 0)
    }
}

/// Insert a workspace row inside the caller's transaction
pub async fn insert(conn: &mut SqliteConnection, new: &NewWorkspace<'_>) -> Result<()> {
    let now = now_timestamp();

    sqlx::query(
        r#"
        INSERT INTO workspaces (id, slug, name, owner_id, settings_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.id)
    .bind(new.slug)
    .bind(new.name)
    .bind(new.owner_id)
    .bind(new.settings_json.to_string())
    .bind(&now)
    .bind(&now)
    .execute(conn)
    .await
    .context("Failed to create workspace")?;

    Ok(())
}

fn row_to_workspace(row: WorkspaceRow) -> Workspace {
    Workspace {
        id: row.id,
        slug: row.slug,
        name: row.name,
        owner_id: row.owner_id,
        settings_json: serde_json::from_str(&row.settings_json)
            .unwrap_or_else(|_| serde_json::json!({})),
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
        deleted_at: parse_optional_timestamp(row.deleted_at.as_deref()),
    }
}
