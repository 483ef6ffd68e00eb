//! Notification repository

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{now_timestamp, parse_db_timestamp, parse_optional_timestamp};
use crate::models::{NewNotification, Notification};

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, type, payload, sent_via, sent_at, read_at, dismissed_at FROM notifications";

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: Option<String>,
    #[sqlx(rename = "type")]
    kind: String,
    payload: Option<String>,
    sent_via: String,
    sent_at: String,
    read_at: Option<String>,
    dismissed_at: Option<String>,
}

/// Which timestamp a recipient stamps on their own notification
#[derive(Debug, Clone, Copy)]
enum Mark {
    Read,
    Dismissed,
}

impl Mark {
    fn column(self) -> &'static str {
        match self {
            Mark::Read => "read_at",
            Mark::Dismissed => "dismissed_at",
        }
    }
}

pub struct NotificationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: &NewNotification) -> Result<Notification> {
        let id = Uuid::new_v4().to_string();
        let sent_at = now_timestamp();
        let payload = new.payload.as_ref().map(|p| p.to_string());

        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, type, payload, sent_via, sent_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(new.user_id.as_deref())
        .bind(&new.kind)
        .bind(payload.as_deref())
        .bind(&new.sent_via)
        .bind(&sent_at)
        .execute(self.pool)
        .await
        .context("Failed to insert notification")?;

        Ok(Notification {
            id,
            user_id: new.user_id.clone(),
            kind: new.kind.clone(),
            payload: new.payload.clone(),
            sent_via: new.sent_via.clone(),
            sent_at: parse_db_timestamp(&sent_at),
            read_at: None,
            dismissed_at: None,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .context("Failed to get notification")?;
        Ok(row.map(row_to_notification))
    }

    /// Newest first
    pub async fn list_all(&self) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "{} ORDER BY sent_at DESC",
            SELECT_COLUMNS
        ))
        .fetch_all(self.pool)
        .await
        .context("Failed to list notifications")?;
        Ok(rows.into_iter().map(row_to_notification).collect())
    }

    /// A user's notifications, newest first
    pub async fn list_for_user(&self, user_id: &str, unread_only: bool) -> Result<Vec<Notification>> {
        let mut sql = format!("{} WHERE user_id = ?", SELECT_COLUMNS);
        if unread_only {
            sql.push_str(" AND read_at IS NULL");
        }
        sql.push_str(" ORDER BY sent_at DESC");

        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await
            .context("Failed to list user notifications")?;
        Ok(rows.into_iter().map(row_to_notification).collect())
    }

    /// Stamp `read_at`; `None` unless the notification belongs to `user_id`
    pub async fn mark_read(&self, id: &str, user_id: &str) -> Result<Option<Notification>> {
        self.mark(id, user_id, Mark::Read).await
    }

    /// Stamp `dismissed_at`; `None` unless the notification belongs to `user_id`
    pub async fn mark_dismissed(&self, id: &str, user_id: &str) -> Result<Option<Notification>> {
        self.mark(id, user_id, Mark::Dismissed).await
    }

    async fn mark(&self, id: &str, user_id: &str, mark: Mark) -> Result<Option<Notification>> {
        // The first stamp is kept
        let sql = format!(
            "UPDATE notifications SET {col} = COALESCE({col}, ?) WHERE id = ? AND user_id = ?",
            col = mark.column()
        );
        let result = sqlx::query(&sql)
            .bind(now_timestamp())
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await
            .context("Failed to update notification")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }
}

fn row_to_notification(row: NotificationRow) -> Notification {
    Notification {
        id: row.id,
        user_id: row.user_id,
        kind: row.kind,
        payload: row.payload.and_then(|s| serde_json::from_str(&s).ok()),
        sent_via: row.sent_via,
        sent_at: parse_db_timestamp(&row.sent_at),
        read_at: parse_optional_timestamp(row.read_at.as_deref()),
        dismissed_at: parse_optional_timestamp(row.dismissed_at.as_deref()),
    }
}
