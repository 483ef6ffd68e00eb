//! Audit event repository

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{now_timestamp, parse_db_timestamp};
use crate::models::{AuditEvent, AuditEventQuery};

const DEFAULT_LIMIT: u32 = 100;

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    event_type: String,
    actor_id: Option<String>,
    workspace_id: Option<String>,
    details: Option<String>,
    created_at: String,
}

pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        event_type: &str,
        actor_id: Option<&str>,
        workspace_id: Option<&str>,
        details: Option<&serde_json::Value>,
    ) -> Result<AuditEvent> {
        let id = Uuid::new_v4().to_string();
        let created_at = now_timestamp();
        let details_str = details.map(|d| d.to_string());

        sqlx::query(
            r#"
            INSERT INTO audit_events (id, event_type, actor_id, workspace_id, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(event_type)
        .bind(actor_id)
        .bind(workspace_id)
        .bind(details_str.as_deref())
        .bind(&created_at)
        .execute(self.pool)
        .await
        .context("Failed to insert audit event")?;

        Ok(AuditEvent {
            id,
            event_type: event_type.to_string(),
            actor_id: actor_id.map(str::to_string),
            workspace_id: workspace_id.map(str::to_string),
            details: details.cloned(),
            created_at: parse_db_timestamp(&created_at),
        })
    }

    /// Newest first, filtered by whichever query fields are set
    pub async fn list(&self, query: &AuditEventQuery) -> Result<Vec<AuditEvent>> {
        let mut sql = String::from(
            "SELECT id, event_type, actor_id, workspace_id, details, created_at FROM audit_events WHERE 1 = 1",
        );

        if query.event_type.is_some() {
            sql.push_str(" AND event_type = ?");
        }
        if query.actor_id.is_some() {
            sql.push_str(" AND actor_id = ?");
        }
        if query.workspace_id.is_some() {
            sql.push_str(" AND workspace_id = ?");
        }

        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query_as::<_, AuditRow>(&sql);
        if let Some(ref event_type) = query.event_type {
            q = q.bind(event_type);
        }
        if let Some(ref actor_id) = query.actor_id {
            q = q.bind(actor_id);
        }
        if let Some(ref workspace_id) = query.workspace_id {
            q = q.bind(workspace_id);
        }
        q = q
            .bind(query.limit.unwrap_or(DEFAULT_LIMIT) as i64)
            .bind(query.offset.unwrap_or(0) as i64);

        let rows = q
            .fetch_all(self.pool)
            .await
            .context("Failed to list audit events")?;

        Ok(rows.into_iter().map(row_to_audit).collect())
    }

    pub async fn list_by_actor(&self, actor_id: &str) -> Result<Vec<AuditEvent>> {
        self.list(&AuditEventQuery {
            actor_id: Some(actor_id.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn list_by_workspace(&self, workspace_id: &str) -> Result<Vec<AuditEvent>> {
        self.list(&AuditEventQuery {
            workspace_id: Some(workspace_id.to_string()),
            ..Default::default()
        })
        .await
    }
}

fn row_to_audit(row: AuditRow) -> AuditEvent {
    AuditEvent {
        id: row.id,
        event_type: row.event_type,
        actor_id: row.actor_id,
        workspace_id: row.workspace_id,
        details: row.details.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_db_timestamp(&row.created_at),
    }
}
