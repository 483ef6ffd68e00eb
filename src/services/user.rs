//! User service

use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::db::{DbPool, UserRepository};
use crate::models::{CreateUserRequest, Principal, UpdateUserRequest, User};
use crate::services::audit::{events, record_event};
use crate::utils::AppError;

#[derive(Clone)]
pub struct UserService {
    db: DbPool,
}

impl UserService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        Ok(UserRepository::new(&self.db).list().await?)
    }

    pub async fn create(&self, actor_id: &str, req: &CreateUserRequest) -> Result<User, AppError> {
        req.validate()?;

        let repo = UserRepository::new(&self.db);
        if repo.get_by_email(&req.email).await?.is_some() {
            return Err(AppError::conflict("A user with this email already exists"));
        }

        let user = repo.create(req).await?;
        record_event(
            &self.db,
            events::USER_CREATED,
            Some(actor_id),
            None,
            json!({ "user_id": user.id, "source": "admin" }),
        )
        .await;
        Ok(user)
    }

    /// A user record, visible to the user themselves or a global admin
    pub async fn get(&self, actor: &Principal, id: &str) -> Result<User, AppError> {
        ensure_self_or_admin(actor, id)?;
        UserRepository::new(&self.db)
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    pub async fn update(
        &self,
        actor: &Principal,
        id: &str,
        req: &UpdateUserRequest,
    ) -> Result<User, AppError> {
        ensure_self_or_admin(actor, id)?;
        if req.changes_privileges() && !actor.is_global_admin {
            return Err(AppError::forbidden(
                "Only administrators can change admin or disabled flags",
            ));
        }
        req.validate()?;

        let user = UserRepository::new(&self.db)
            .update(id, req)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        record_event(
            &self.db,
            events::USER_UPDATED,
            Some(&actor.id),
            None,
            json!({ "user_id": id, "privileges_changed": req.changes_privileges() }),
        )
        .await;
        Ok(user)
    }

    pub async fn delete(&self, actor_id: &str, id: &str) -> Result<(), AppError> {
        if !UserRepository::new(&self.db).delete(id).await? {
            return Err(AppError::not_found("User not found"));
        }

        info!(user_id = %id, "User deleted");
        record_event(
            &self.db,
            events::USER_DELETED,
            Some(actor_id),
            None,
            json!({ "user_id": id }),
        )
        .await;
        Ok(())
    }

    /// Caller must already be an active member of `workspace_id`
    pub async fn set_primary_workspace(
        &self,
        user_id: &str,
        workspace_id: &str,
    ) -> Result<User, AppError> {
        let repo = UserRepository::new(&self.db);
        if !repo.set_primary_workspace(user_id, workspace_id).await? {
            return Err(AppError::not_found("User not found"));
        }

        record_event(
            &self.db,
            events::PRIMARY_WORKSPACE_SET,
            Some(user_id),
            Some(workspace_id),
            json!({}),
        )
        .await;

        repo.get_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }
}

fn ensure_self_or_admin(actor: &Principal, id: &str) -> Result<(), AppError> {
    if actor.id == id || actor.is_global_admin {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only access your own user record"))
    }
}
