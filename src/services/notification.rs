//! Notifications
//!
//! Every notification is stored. The email channel has no transport wired
//! in, so an email-bound notification is logged with its recipient instead
//! of being sent.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::db::{DbPool, NotificationRepository, UserRepository};
use crate::models::{
    NewNotification, Notification, SendNotificationRequest, EMAIL_CHANNEL, IN_APP_CHANNEL,
};
use crate::services::audit::{events, record_event};
use crate::utils::{validate_email, validate_notification_label, AppError};

const NOT_FOUND: &str = "Notification not found";

#[derive(Clone)]
pub struct NotificationService {
    db: DbPool,
}

impl NotificationService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Store a notification and hand email-bound ones to the mail log
    pub async fn notify(
        &self,
        new: NewNotification,
        to_email: Option<&str>,
    ) -> anyhow::Result<Notification> {
        if new.sent_via == EMAIL_CHANNEL {
            if let Some(to) = to_email {
                log_email(to, &new.kind, new.payload.as_ref());
            }
        }

        let notification = NotificationRepository::new(&self.db).insert(&new).await?;
        info!(
            notification_id = %notification.id,
            user_id = notification.user_id.as_deref().unwrap_or("-"),
            kind = %notification.kind,
            "Notification stored"
        );
        Ok(notification)
    }

    /// Admin send to any user
    pub async fn send(
        &self,
        actor_id: &str,
        req: &SendNotificationRequest,
    ) -> Result<Notification, AppError> {
        let user_id = req.user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::bad_request("user_id is required"));
        }
        if !validate_notification_label(&req.kind) {
            return Err(AppError::bad_request(
                "Type must be alphanumeric and may include underscores or dashes only",
            ));
        }
        let sent_via = req.sent_via.as_deref().unwrap_or(IN_APP_CHANNEL);
        if !validate_notification_label(sent_via) {
            return Err(AppError::bad_request(
                "sent_via must be alphanumeric and may include underscores or dashes only",
            ));
        }
        let to_email = req.to_email.as_deref().map(str::trim);
        if to_email.is_some_and(|e| !validate_email(e)) {
            return Err(AppError::bad_request("Invalid email address"));
        }

        if UserRepository::new(&self.db).get_by_id(user_id).await?.is_none() {
            return Err(AppError::not_found("User not found"));
        }

        let mut payload = req.payload.clone().unwrap_or_else(|| json!({}));
        if let Value::Object(ref mut map) = payload {
            map.insert("userId".to_string(), Value::String(user_id.to_string()));
        }

        let notification = self
            .notify(
                NewNotification {
                    user_id: Some(user_id.to_string()),
                    kind: req.kind.clone(),
                    payload: Some(payload),
                    sent_via: sent_via.to_string(),
                },
                to_email,
            )
            .await?;

        record_event(
            &self.db,
            events::NOTIFICATION_SENT,
            Some(actor_id),
            None,
            json!({ "notification_id": notification.id, "user_id": user_id, "type": req.kind }),
        )
        .await;

        Ok(notification)
    }

    pub async fn list_all(&self) -> Result<Vec<Notification>, AppError> {
        Ok(NotificationRepository::new(&self.db).list_all().await?)
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, AppError> {
        Ok(NotificationRepository::new(&self.db)
            .list_for_user(user_id, unread_only)
            .await?)
    }

    /// Someone else's notification is reported as missing
    pub async fn mark_read(&self, user_id: &str, id: &str) -> Result<Notification, AppError> {
        let marked = NotificationRepository::new(&self.db)
            .mark_read(id, user_id)
            .await?;
        marked.ok_or_else(|| {
            warn!(notification_id = %id, user_id = %user_id, "Mark read failed: not the recipient");
            AppError::not_found(NOT_FOUND)
        })
    }

    pub async fn dismiss(&self, user_id: &str, id: &str) -> Result<Notification, AppError> {
        let marked = NotificationRepository::new(&self.db)
            .mark_dismissed(id, user_id)
            .await?;
        marked.ok_or_else(|| {
            warn!(notification_id = %id, user_id = %user_id, "Dismiss failed: not the recipient");
            AppError::not_found(NOT_FOUND)
        })
    }
}

fn log_email(to: &str, kind: &str, payload: Option<&Value>) {
    info!(
        to = %to,
        template = %kind,
        payload = %payload.cloned().unwrap_or(serde_json::Value::Null),
        "Email delivery disabled, notification logged"
    );
}
