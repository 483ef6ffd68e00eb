//! Membership repository
//!
//! Plain reads go through [`MembershipRepository`]. Mutations that must be
//! checked against the "at least one active OWNER/ADMIN" rule are free
//! functions over a connection so the caller can run them inside the same
//! transaction as the check; their `WHERE` clauses re-assert the rule so a
//! concurrent writer cannot slip between check and write.

use anyhow::{Context, Result};
use sqlx::{SqliteConnection, SqlitePool};

use super::{now_timestamp, parse_db_timestamp, parse_optional_timestamp};
use crate::models::{Membership, MembershipRole, MembershipStatus, WorkspaceMember};

const MEMBERSHIP_COLUMNS: &str =
    "user_id, workspace_id, role, status, invited_by, joined_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    user_id: String,
    workspace_id: String,
    role: String,
    status: String,
    invited_by: Option<String>,
    joined_at: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    #[sqlx(flatten)]
    membership: MembershipRow,
    email: Option<String>,
    full_name: Option<String>,
}

pub struct MembershipRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MembershipRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: &str, workspace_id: &str) -> Result<Option<Membership>> {
        let mut conn = self.pool.acquire().await?;
        get(&mut *conn, user_id, workspace_id).await
    }

    /// Members of a workspace with their user details, removed rows excluded
    pub async fn list_for_workspace(&self, workspace_id: &str) -> Result<Vec<WorkspaceMember>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT m.user_id, m.workspace_id, m.role, m.status, m.invited_by, m.joined_at,
                   m.created_at, m.updated_at, u.email, u.full_name
            FROM memberships m
            LEFT JOIN users u ON u.id = m.user_id
            WHERE m.workspace_id = ? AND m.status <> 'removed'
            ORDER BY m.created_at
            "#,
        )
        .bind(workspace_id)
        .fetch_all(self.pool)
        .await
        .context("Failed to list workspace members")?;

        Ok(rows
            .into_iter()
            .map(|row| WorkspaceMember {
                membership: row_to_membership(row.membership),
                email: row.email,
                full_name: row.full_name,
            })
            .collect())
    }

    pub async fn count_active_for_user(&self, user_id: &str) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM memberships m
            JOIN workspaces w ON w.id = m.workspace_id
            WHERE m.user_id = ? AND m.status = 'active' AND w.deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await
        .context("Failed to count user memberships")
    }

    /// Create a pending MEMBER invitation
    pub async fn create_invite(
        &self,
        user_id: &str,
        workspace_id: &str,
        invited_by: &str,
    ) -> Result<Membership> {
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO memberships (user_id, workspace_id, role, status, invited_by, created_at, updated_at)
            VALUES (?, ?, 'MEMBER', 'pending', ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(workspace_id)
        .bind(invited_by)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await
        .context("Failed to create membership invite")?;

        self.get(user_id, workspace_id)
            .await?
            .context("Failed to retrieve created membership")
    }

    /// Move a `removed` row back to `pending` with the role reset to MEMBER
    pub async fn reinvite(
        &self,
        user_id: &str,
        workspace_id: &str,
        invited_by: &str,
    ) -> Result<Option<Membership>> {
        let result = sqlx::query(
            r#"
            UPDATE memberships
            SET status = 'pending', role = 'MEMBER', invited_by = ?, joined_at = NULL, updated_at = ?
            WHERE user_id = ? AND workspace_id = ? AND status = 'removed'
            "#,
        )
        .bind(invited_by)
        .bind(now_timestamp())
        .bind(user_id)
        .bind(workspace_id)
        .execute(self.pool)
        .await
        .context("Failed to re-invite member")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(user_id, workspace_id).await
    }

    /// Compare-and-set on status for transitions that do not touch the admin
    /// invariant (accept, decline). Returns `false` if the row was not in
    /// `from` any more.
    pub async fn transition_status(
        &self,
        user_id: &str,
        workspace_id: &str,
        from: MembershipStatus,
        to: MembershipStatus,
    ) -> Result<bool> {
        let now = now_timestamp();
        let joined_at = (to == MembershipStatus::Active).then(|| now.clone());

        let result = sqlx::query(
            r#"
            UPDATE memberships
            SET status = ?, joined_at = COALESCE(?, joined_at), updated_at = ?
            WHERE user_id = ? AND workspace_id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(joined_at)
        .bind(&now)
        .bind(user_id)
        .bind(workspace_id)
        .bind(from.as_str())
        .execute(self.pool)
        .await
        .context("Failed to update membership status")?;

        Ok(result.rows_affected() > 0)
    }
}

pub async fn get(
    conn: &mut SqliteConnection,
    user_id: &str,
    workspace_id: &str,
) -> Result<Option<Membership>> {
    let sql = format!(
        "SELECT {} FROM memberships WHERE user_id = ? AND workspace_id = ?",
        MEMBERSHIP_COLUMNS
    );
    let row = sqlx::query_as::<_, MembershipRow>(&sql)
        .bind(user_id)
        .bind(workspace_id)
        .fetch_optional(conn)
        .await
        .context("Failed to get membership")?;

    Ok(row.map(row_to_membership))
}

/// Touch the workspace row so SQLite takes its write lock before the
/// transaction reads any membership counts.
pub async fn lock_workspace(conn: &mut SqliteConnection, workspace_id: &str) -> Result<()> {
    sqlx::query("UPDATE workspaces SET updated_at = updated_at WHERE id = ?")
        .bind(workspace_id)
        .execute(conn)
        .await
        .context("Failed to lock workspace")?;
    Ok(())
}

/// Insert an active membership, used when a workspace is created
pub async fn insert_active(
    conn: &mut SqliteConnection,
    user_id: &str,
    workspace_id: &str,
    role: MembershipRole,
) -> Result<()> {
    let now = now_timestamp();

    sqlx::query(
        r#"
        INSERT INTO memberships (user_id, workspace_id, role, status, joined_at, created_at, updated_at)
        VALUES (?, ?, ?, 'active', ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(workspace_id)
    .bind(role.as_str())
    .bind(&now)
    .bind(&now)
    .bind(&now)
    .execute(conn)
    .await
    .context("Failed to create membership")?;

    Ok(())
}

/// Active OWNER/ADMIN memberships of a workspace, optionally excluding one user
pub async fn count_active_admins(
    conn: &mut SqliteConnection,
    workspace_id: &str,
    excluding_user_id: Option<&str>,
) -> Result<i64> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM memberships
        WHERE workspace_id = ?
          AND status = 'active'
          AND role IN ('OWNER', 'ADMIN')
          AND (? IS NULL OR user_id <> ?)
        "#,
    )
    .bind(workspace_id)
    .bind(excluding_user_id)
    .bind(excluding_user_id)
    .fetch_one(conn)
    .await
    .context("Failed to count workspace admins")
}

/// Set a membership to `removed` from one of `from`.
///
/// A privileged target is only removed while another active OWNER/ADMIN
/// exists. Returns the number of rows changed (0 or 1).
pub async fn mark_removed_guarded(
    conn: &mut SqliteConnection,
    user_id: &str,
    workspace_id: &str,
    from: &[MembershipStatus],
) -> Result<u64> {
    let statuses = from
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        r#"
        UPDATE memberships
        SET status = 'removed', updated_at = ?
        WHERE user_id = ? AND workspace_id = ? AND status IN ({})
          AND (
            role NOT IN ('OWNER', 'ADMIN')
            OR EXISTS (
                SELECT 1 FROM memberships other
                WHERE other.workspace_id = memberships.workspace_id
                  AND other.user_id <> memberships.user_id
                  AND other.status = 'active'
                  AND other.role IN ('OWNER', 'ADMIN')
            )
          )
        "#,
        statuses
    );

    let result = sqlx::query(&sql)
        .bind(now_timestamp())
        .bind(user_id)
        .bind(workspace_id)
        .execute(conn)
        .await
        .context("Failed to remove membership")?;

    Ok(result.rows_affected())
}

/// Change the role of an active membership.
///
/// Demoting an OWNER/ADMIN only applies while more than one active
/// OWNER/ADMIN exists. Returns the number of rows changed (0 or 1).
pub async fn update_role_guarded(
    conn: &mut SqliteConnection,
    user_id: &str,
    workspace_id: &str,
    role: MembershipRole,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE memberships
        SET role = ?, updated_at = ?
        WHERE user_id = ? AND workspace_id = ? AND status = 'active'
          AND (
            ? IN ('OWNER', 'ADMIN')
            OR role NOT IN ('OWNER', 'ADMIN')
            OR (
                SELECT COUNT(*) FROM memberships other
                WHERE other.workspace_id = memberships.workspace_id
                  AND other.status = 'active'
                  AND other.role IN ('OWNER', 'ADMIN')
            ) > 1
          )
        "#,
    )
    .bind(role.as_str())
    .bind(now_timestamp())
    .bind(user_id)
    .bind(workspace_id)
    .bind(role.as_str())
    .execute(conn)
    .await
    .context("Failed to update membership role")?;

    Ok(result.rows_affected())
}

fn row_to_membership(row: MembershipRow) -> Membership {
    Membership {
        user_id: row.user_id,
        workspace_id: row.workspace_id,
        role: row.role.parse().unwrap_or(MembershipRole::Member),
        // Unknown statuses are treated as removed so they never authorize
        status: row.status.parse().unwrap_or(MembershipStatus::Removed),
        invited_by: row.invited_by,
        joined_at: parse_optional_timestamp(row.joined_at.as_deref()),
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
