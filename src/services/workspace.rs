//! Workspace service for creating, updating and deleting tenants

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{
    membership_repository, subscription_repository, workspace_repository, DbPool,
    MembershipRepository, SubscriptionRepository, UserRepository, WorkspaceRepository,
};
use crate::models::{
    CreateWorkspaceRequest, MembershipRole, PendingInvite, SlugAvailability,
    UpdateWorkspaceRequest, UserWorkspace, Workspace,
};
use crate::services::audit::{events, record_event};
use crate::utils::slug::{with_random_suffix, MAX_SLUG_ATTEMPTS};
use crate::utils::{slugify, AppError};

/// Slug and name of the shared guest workspace
pub const GUEST_WORKSPACE_SLUG: &str = "guest-workspace";
pub const GUEST_WORKSPACE_NAME: &str = "Guest Workspace";

/// Workspace service
#[derive(Clone)]
pub struct WorkspaceService {
    db: DbPool,
}

impl WorkspaceService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn list_all(&self) -> Result<Vec<Workspace>, AppError> {
        Ok(WorkspaceRepository::new(&self.db).list().await?)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserWorkspace>, AppError> {
        Ok(WorkspaceRepository::new(&self.db)
            .list_for_user(user_id)
            .await?)
    }

    pub async fn list_invites(&self, user_id: &str) -> Result<Vec<PendingInvite>, AppError> {
        Ok(WorkspaceRepository::new(&self.db)
            .list_pending_invites(user_id)
            .await?)
    }

    pub async fn get(&self, id: &str) -> Result<Workspace, AppError> {
        WorkspaceRepository::new(&self.db)
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Workspace not found"))
    }

    /// Whether `slug` is free, soft-deleted workspaces included
    pub async fn slug_availability(&self, slug: &str) -> Result<SlugAvailability, AppError> {
        let slug = slugify(slug);
        let available =
            !slug.is_empty() && !WorkspaceRepository::new(&self.db).slug_exists(&slug, None).await?;
        Ok(SlugAvailability { slug, available })
    }

    /// Find a free slug derived from `source`
    async fn unique_slug(&self, source: &str, excluding_id: Option<&str>) -> Result<String, AppError> {
        let base = match slugify(source) {
            s if s.is_empty() => "workspace".to_string(),
            s => s,
        };

        let repo = WorkspaceRepository::new(&self.db);
        if !repo.slug_exists(&base, excluding_id).await? {
            return Ok(base);
        }

        for _ in 0..MAX_SLUG_ATTEMPTS {
            let candidate = with_random_suffix(&base);
            if !repo.slug_exists(&candidate, excluding_id).await? {
                return Ok(candidate);
            }
        }

        warn!(base = %base, "Exhausted slug attempts");
        Err(AppError::conflict(format!(
            "Could not generate a unique slug after {} attempts",
            MAX_SLUG_ATTEMPTS
        )))
    }

    /// Create a workspace with its creator membership and default subscription.
    ///
    /// The creator becomes OWNER when they are also the owner, MEMBER
    /// otherwise.
    pub async fn create(
        &self,
        creator_id: &str,
        owner_id: &str,
        req: &CreateWorkspaceRequest,
    ) -> Result<Workspace, AppError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::bad_request("Workspace name is required"));
        }

        let slug = self
            .unique_slug(req.slug.as_deref().unwrap_or(name), None)
            .await?;
        let id = Uuid::new_v4().to_string();
        let settings = req.settings_json.clone().unwrap_or_else(|| json!({}));
        let role = if creator_id == owner_id {
            MembershipRole::Owner
        } else {
            MembershipRole::Member
        };

        let mut tx = self.db.begin().await?;
        workspace_repository::insert(
            &mut *tx,
            &workspace_repository::NewWorkspace {
                id: &id,
                slug: &slug,
                name,
                owner_id: Some(owner_id),
                settings_json: &settings,
            },
        )
        .await?;
        membership_repository::insert_active(&mut *tx, creator_id, &id, role).await?;
        subscription_repository::insert_default(&mut *tx, &id).await?;
        tx.commit().await?;

        info!(workspace_id = %id, slug = %slug, owner_id = %owner_id, "Workspace created");
        record_event(
            &self.db,
            events::WORKSPACE_CREATED,
            Some(creator_id),
            Some(&id),
            json!({ "slug": slug, "owner_id": owner_id }),
        )
        .await;

        self.get(&id).await
    }

    pub async fn update(
        &self,
        id: &str,
        actor_id: &str,
        req: &UpdateWorkspaceRequest,
    ) -> Result<Workspace, AppError> {
        let current = self.get(id).await?;

        let slug = match req.slug.as_deref() {
            Some(s) if s.trim().is_empty() => {
                return Err(AppError::bad_request("Slug cannot be empty"));
            }
            Some(s) if slugify(s) == current.slug => current.slug.clone(),
            Some(s) => self.unique_slug(s, Some(id)).await?,
            None => current.slug.clone(),
        };
        let name = req.name.as_deref().map(str::trim).unwrap_or(&current.name);
        let settings = req.settings_json.as_ref().unwrap_or(&current.settings_json);

        let updated = WorkspaceRepository::new(&self.db)
            .update(id, name, &slug, settings)
            .await?
            .ok_or_else(|| AppError::not_found("Workspace not found"))?;

        record_event(
            &self.db,
            events::WORKSPACE_UPDATED,
            Some(actor_id),
            Some(id),
            json!({ "slug": updated.slug, "name": updated.name }),
        )
        .await;

        Ok(updated)
    }

    /// Soft-delete a workspace on behalf of `actor_id`
    pub async fn delete(&self, id: &str, actor_id: &str) -> Result<(), AppError> {
        let active = MembershipRepository::new(&self.db)
            .count_active_for_user(actor_id)
            .await?;
        if active <= 1 {
            return Err(AppError::bad_request(
                "Cannot delete your only workspace. Create another workspace first",
            ));
        }

        let actor = UserRepository::new(&self.db).get_by_id(actor_id).await?;
        if actor.and_then(|u| u.primary_workspace_id).as_deref() == Some(id) {
            return Err(AppError::forbidden(
                "Cannot delete your primary workspace. Set another workspace as primary first",
            ));
        }

        if !WorkspaceRepository::new(&self.db).soft_delete(id).await? {
            return Err(AppError::not_found("Workspace not found"));
        }

        info!(workspace_id = %id, user_id = %actor_id, "Workspace deleted");
        record_event(&self.db, events::WORKSPACE_DELETED, Some(actor_id), Some(id), json!({}))
            .await;

        Ok(())
    }

    /// Make sure the shared guest workspace and its subscription exist
    pub async fn ensure_guest_workspace(&self, workspace_id: &str) -> Result<(), AppError> {
        let has_workspace = WorkspaceRepository::new(&self.db)
            .get_by_id(workspace_id)
            .await?
            .is_some();
        let has_subscription = SubscriptionRepository::new(&self.db)
            .get_by_workspace(workspace_id)
            .await?
            .is_some();
        if has_workspace && has_subscription {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;
        if !has_workspace {
            workspace_repository::insert(
                &mut *tx,
                &workspace_repository::NewWorkspace {
                    id: workspace_id,
                    slug: GUEST_WORKSPACE_SLUG,
                    name: GUEST_WORKSPACE_NAME,
                    owner_id: None,
                    settings_json: &json!({}),
                },
            )
            .await?;
        }
        if !has_subscription {
            subscription_repository::insert_default(&mut *tx, workspace_id).await?;
        }
        tx.commit().await?;

        info!(workspace_id = %workspace_id, "Guest workspace provisioned");
        Ok(())
    }
}
