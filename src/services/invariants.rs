//! Workspace admin invariant
//!
//! Every workspace that has had an active OWNER/ADMIN keeps at least one.
//! Two checks guard it, with deliberately different shapes:
//!
//! - removal and leave count privileged members *excluding* the target,
//! - role downgrade counts privileged members *including* the target and
//!   refuses when that count is one or less.
//!
//! Both run on the caller's transaction connection. The mutations that
//! follow them re-assert the same condition in SQL, so a concurrent writer
//! cannot invalidate the check between read and write.

use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::warn;

use crate::db::membership_repository;
use crate::utils::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// Removing or letting the last OWNER/ADMIN leave
    #[error("Workspace must have at least one owner or admin")]
    LastAdminRemoval,
    /// Demoting the last OWNER/ADMIN to a non-admin role
    #[error("Cannot demote the last workspace admin or owner")]
    LastAdminDemotion,
}

impl From<InvariantViolation> for AppError {
    fn from(violation: InvariantViolation) -> Self {
        match violation {
            InvariantViolation::LastAdminRemoval => AppError::Forbidden(violation.to_string()),
            InvariantViolation::LastAdminDemotion => AppError::BadRequest(violation.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum InvariantError {
    #[error(transparent)]
    Violation(#[from] InvariantViolation),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Fails unless an active OWNER/ADMIN other than `excluding_user_id` exists
pub async fn ensure_workspace_has_admin(
    conn: &mut SqliteConnection,
    workspace_id: &str,
    excluding_user_id: &str,
) -> Result<(), InvariantError> {
    let remaining =
        membership_repository::count_active_admins(conn, workspace_id, Some(excluding_user_id))
            .await?;

    if remaining == 0 {
        warn!(
            workspace_id = %workspace_id,
            user_id = %excluding_user_id,
            "Refusing to remove the last workspace admin"
        );
        return Err(InvariantViolation::LastAdminRemoval.into());
    }
    Ok(())
}

/// Fails when demoting one privileged member would leave none
pub async fn ensure_demotion_keeps_admin(
    conn: &mut SqliteConnection,
    workspace_id: &str,
) -> Result<(), InvariantError> {
    let admins = membership_repository::count_active_admins(conn, workspace_id, None).await?;

    if admins <= 1 {
        warn!(workspace_id = %workspace_id, admins, "Refusing to demote the last workspace admin");
        return Err(InvariantViolation::LastAdminDemotion.into());
    }
    Ok(())
}
