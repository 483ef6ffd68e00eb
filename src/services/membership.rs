//! Workspace membership management
//!
//! Invitations, acceptance, removal, leaving and role changes. Status
//! changes go through [`MembershipStatus::transition`]; anything that could
//! drop the last OWNER/ADMIN runs inside a transaction together with the
//! checks in [`crate::services::invariants`]. Invitations also leave a
//! `workspace-invite` or `platform-invite` notification for the invitee.

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AppInfoConfig;
use crate::db::{
    membership_repository, DbPool, MembershipRepository, UserRepository, WorkspaceRepository,
};
use crate::models::{
    notification_kinds, Membership, MembershipEvent, MembershipRole, MembershipStatus,
    NewNotification, WorkspaceMember, EMAIL_CHANNEL,
};
use crate::services::audit::{events, record_event};
use crate::services::invariants::{self, InvariantError, InvariantViolation};
use crate::services::NotificationService;
use crate::utils::{validate_email, AppError};

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Only active workspace owners or admins can {0}")]
    NotWorkspaceAdmin(&'static str),
    #[error("User is already a member or has a pending invite")]
    AlreadyMember,
    #[error("{0}")]
    NotFound(&'static str),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<InvariantError> for MembershipError {
    fn from(err: InvariantError) -> Self {
        match err {
            InvariantError::Violation(v) => MembershipError::Invariant(v),
            InvariantError::Storage(e) => MembershipError::Storage(e),
        }
    }
}

impl From<sqlx::Error> for MembershipError {
    fn from(err: sqlx::Error) -> Self {
        MembershipError::Storage(err.into())
    }
}

impl From<MembershipError> for AppError {
    fn from(err: MembershipError) -> Self {
        match err {
            MembershipError::InvalidEmail | MembershipError::AlreadyMember => {
                AppError::BadRequest(err.to_string())
            }
            MembershipError::NotWorkspaceAdmin(_) => AppError::Forbidden(err.to_string()),
            MembershipError::NotFound(msg) => AppError::NotFound(msg.to_string()),
            MembershipError::Invariant(v) => v.into(),
            MembershipError::Storage(e) => AppError::Internal(format!("{:#}", e)),
        }
    }
}

pub type MembershipResult<T> = Result<T, MembershipError>;

/// What an invitation turned into
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum InviteOutcome {
    /// New or re-used membership row, now pending
    Invited(Membership),
    /// No platform account for the email yet; nothing stored
    PlatformInvite {},
}

pub struct MembershipService {
    pool: DbPool,
    app: AppInfoConfig,
}

impl MembershipService {
    /// `app` supplies the product name and link put into invitations
    pub fn new(pool: DbPool, app: AppInfoConfig) -> Self {
        Self { pool, app }
    }

    pub async fn list_members(&self, workspace_id: &str) -> MembershipResult<Vec<WorkspaceMember>> {
        Ok(MembershipRepository::new(&self.pool)
            .list_for_workspace(workspace_id)
            .await?)
    }

    /// Invite `email` to the workspace as a pending MEMBER
    pub async fn invite(
        &self,
        workspace_id: &str,
        inviter_id: &str,
        email: &str,
    ) -> MembershipResult<InviteOutcome> {
        let email = email.trim();
        if !validate_email(email) {
            return Err(MembershipError::InvalidEmail);
        }

        let memberships = MembershipRepository::new(&self.pool);
        let inviter = memberships.get(inviter_id, workspace_id).await?;
        if !inviter.as_ref().is_some_and(Membership::is_active_admin) {
            return Err(MembershipError::NotWorkspaceAdmin("invite members"));
        }

        let Some(invitee) = UserRepository::new(&self.pool).get_by_email(email).await? else {
            info!(workspace_id = %workspace_id, "Invitee has no account, sending platform invite");
            record_event(
                &self.pool,
                events::PLATFORM_INVITE,
                Some(inviter_id),
                Some(workspace_id),
                json!({ "email": email }),
            )
            .await;
            self.notify_invitee(
                notification_kinds::PLATFORM_INVITE,
                None,
                email,
                workspace_id,
                inviter_id,
            )
            .await;
            return Ok(InviteOutcome::PlatformInvite {});
        };

        let membership = match memberships.get(&invitee.id, workspace_id).await? {
            Some(existing) if existing.status.transition(MembershipEvent::Reinvite).is_ok() => {
                memberships
                    .reinvite(&invitee.id, workspace_id, inviter_id)
                    .await?
                    .ok_or(MembershipError::AlreadyMember)?
            }
            Some(_) => return Err(MembershipError::AlreadyMember),
            None => {
                memberships
                    .create_invite(&invitee.id, workspace_id, inviter_id)
                    .await?
            }
        };

        record_event(
            &self.pool,
            events::MEMBER_INVITED,
            Some(inviter_id),
            Some(workspace_id),
            json!({ "user_id": invitee.id, "email": email }),
        )
        .await;
        self.notify_invitee(
            notification_kinds::WORKSPACE_INVITE,
            Some(&invitee.id),
            email,
            workspace_id,
            inviter_id,
        )
        .await;

        Ok(InviteOutcome::Invited(membership))
    }

    /// Store the invitation notification. A failure is logged and does not
    /// undo the invitation.
    async fn notify_invitee(
        &self,
        kind: &str,
        invitee_id: Option<&str>,
        email: &str,
        workspace_id: &str,
        inviter_id: &str,
    ) {
        let payload = match self.invite_payload(email, workspace_id, inviter_id).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    error = %format!("{:#}", e),
                    kind = kind,
                    "Failed to build invite notification"
                );
                return;
            }
        };

        let new = NewNotification {
            user_id: invitee_id.map(str::to_string),
            kind: kind.to_string(),
            payload: Some(payload),
            sent_via: EMAIL_CHANNEL.to_string(),
        };
        if let Err(e) = NotificationService::new(self.pool.clone())
            .notify(new, Some(email))
            .await
        {
            warn!(
                error = %format!("{:#}", e),
                kind = kind,
                "Failed to store invite notification"
            );
        }
    }

    async fn invite_payload(
        &self,
        email: &str,
        workspace_id: &str,
        inviter_id: &str,
    ) -> anyhow::Result<serde_json::Value> {
        let inviter_name = UserRepository::new(&self.pool)
            .get_by_id(inviter_id)
            .await?
            .map(|u| u.full_name.filter(|n| !n.trim().is_empty()).unwrap_or(u.email))
            .unwrap_or_else(|| "Someone".to_string());
        let workspace_name = WorkspaceRepository::new(&self.pool)
            .get_by_id(workspace_id)
            .await?
            .map(|w| w.name)
            .unwrap_or_else(|| "a workspace".to_string());
        let app_url = self.app.url.trim_end_matches('/');

        Ok(json!({
            "email": email,
            "inviterName": inviter_name,
            "workspaceId": workspace_id,
            "workspaceName": workspace_name,
            "appName": self.app.name,
            "appUrl": app_url,
            "inviteUrl": format!("{}/invites", app_url),
        }))
    }

    pub async fn accept(&self, workspace_id: &str, user_id: &str) -> MembershipResult<Membership> {
        self.respond_to_invite(workspace_id, user_id, MembershipEvent::Accept, events::MEMBER_ACCEPTED)
            .await
    }

    pub async fn decline(&self, workspace_id: &str, user_id: &str) -> MembershipResult<Membership> {
        self.respond_to_invite(workspace_id, user_id, MembershipEvent::Decline, events::MEMBER_DECLINED)
            .await
    }

    async fn respond_to_invite(
        &self,
        workspace_id: &str,
        user_id: &str,
        event: MembershipEvent,
        audit_event: &str,
    ) -> MembershipResult<Membership> {
        const NO_INVITE: &str = "No pending invitation for this workspace";

        let repo = MembershipRepository::new(&self.pool);
        let current = repo
            .get(user_id, workspace_id)
            .await?
            .ok_or(MembershipError::NotFound(NO_INVITE))?;
        let next = current
            .status
            .transition(event)
            .map_err(|_| MembershipError::NotFound(NO_INVITE))?;

        if !repo
            .transition_status(user_id, workspace_id, current.status, next)
            .await?
        {
            return Err(MembershipError::NotFound(NO_INVITE));
        }

        record_event(&self.pool, audit_event, Some(user_id), Some(workspace_id), json!({})).await;

        repo.get(user_id, workspace_id)
            .await?
            .ok_or(MembershipError::NotFound(NO_INVITE))
    }

    /// Remove `target_id` from the workspace (pending or active)
    pub async fn remove(
        &self,
        workspace_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> MembershipResult<()> {
        const NOT_A_MEMBER: &str = "Member not found in this workspace";

        let mut tx = self.pool.begin().await?;
        membership_repository::lock_workspace(&mut *tx, workspace_id).await?;

        let target = membership_repository::get(&mut *tx, target_id, workspace_id)
            .await?
            .ok_or(MembershipError::NotFound(NOT_A_MEMBER))?;
        target
            .status
            .transition(MembershipEvent::Remove)
            .map_err(|_| MembershipError::NotFound(NOT_A_MEMBER))?;

        if target.role.is_privileged() {
            invariants::ensure_workspace_has_admin(&mut *tx, workspace_id, target_id).await?;
        }

        let changed = membership_repository::mark_removed_guarded(
            &mut *tx,
            target_id,
            workspace_id,
            MembershipStatus::sources_for(MembershipEvent::Remove),
        )
        .await?;
        if changed == 0 {
            return Err(InvariantViolation::LastAdminRemoval.into());
        }

        tx.commit().await?;

        record_event(
            &self.pool,
            events::MEMBER_REMOVED,
            Some(actor_id),
            Some(workspace_id),
            json!({ "user_id": target_id, "role": target.role }),
        )
        .await;

        Ok(())
    }

    /// The caller leaves the workspace
    pub async fn leave(&self, workspace_id: &str, user_id: &str) -> MembershipResult<()> {
        const NOT_ACTIVE: &str = "Active membership not found";

        let mut tx = self.pool.begin().await?;
        membership_repository::lock_workspace(&mut *tx, workspace_id).await?;

        let current = membership_repository::get(&mut *tx, user_id, workspace_id)
            .await?
            .ok_or(MembershipError::NotFound(NOT_ACTIVE))?;
        current
            .status
            .transition(MembershipEvent::Leave)
            .map_err(|_| MembershipError::NotFound(NOT_ACTIVE))?;

        if current.role.is_privileged() {
            invariants::ensure_workspace_has_admin(&mut *tx, workspace_id, user_id).await?;
        }

        let changed = membership_repository::mark_removed_guarded(
            &mut *tx,
            user_id,
            workspace_id,
            MembershipStatus::sources_for(MembershipEvent::Leave),
        )
        .await?;
        if changed == 0 {
            return Err(InvariantViolation::LastAdminRemoval.into());
        }

        tx.commit().await?;

        record_event(&self.pool, events::MEMBER_LEFT, Some(user_id), Some(workspace_id), json!({}))
            .await;

        Ok(())
    }

    /// Change the role of an active member
    pub async fn update_role(
        &self,
        workspace_id: &str,
        actor_id: &str,
        target_id: &str,
        role: MembershipRole,
    ) -> MembershipResult<Membership> {
        const NOT_ACTIVE: &str = "Active member not found in this workspace";

        let mut tx = self.pool.begin().await?;
        membership_repository::lock_workspace(&mut *tx, workspace_id).await?;

        let actor = membership_repository::get(&mut *tx, actor_id, workspace_id).await?;
        if !actor.as_ref().is_some_and(Membership::is_active_admin) {
            return Err(MembershipError::NotWorkspaceAdmin("change member roles"));
        }

        let target = membership_repository::get(&mut *tx, target_id, workspace_id)
            .await?
            .filter(Membership::is_active)
            .ok_or(MembershipError::NotFound(NOT_ACTIVE))?;

        let demotion = target.role.is_privileged() && !role.is_privileged();
        if demotion {
            invariants::ensure_demotion_keeps_admin(&mut *tx, workspace_id).await?;
        }

        let changed =
            membership_repository::update_role_guarded(&mut *tx, target_id, workspace_id, role)
                .await?;
        if changed == 0 {
            return Err(if demotion {
                InvariantViolation::LastAdminDemotion.into()
            } else {
                MembershipError::NotFound(NOT_ACTIVE)
            });
        }

        let updated = membership_repository::get(&mut *tx, target_id, workspace_id)
            .await?
            .ok_or(MembershipError::NotFound(NOT_ACTIVE))?;
        tx.commit().await?;

        record_event(
            &self.pool,
            events::MEMBER_ROLE_UPDATED,
            Some(actor_id),
            Some(workspace_id),
            json!({ "user_id": target_id, "from": target.role, "to": role }),
        )
        .await;

        Ok(updated)
    }
}
