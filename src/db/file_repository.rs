//! File metadata repository

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::{now_timestamp, parse_db_timestamp};
use crate::models::FileRecord;

const SELECT_COLUMNS: &str = "SELECT id, user_id, workspace_id, file_name, file_path, url, mime_type, size_bytes, uploaded_at, metadata FROM files";

#[derive(Debug, sqlx::FromRow)]
struct FileRow {
    id: String,
    user_id: String,
    workspace_id: String,
    file_name: String,
    file_path: String,
    url: Option<String>,
    mime_type: Option<String>,
    size_bytes: i64,
    uploaded_at: String,
    metadata: Option<String>,
}

/// Columns supplied by the caller; `uploaded_at` is stamped on insert
#[derive(Debug, Clone)]
pub struct NewFile<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub workspace_id: &'a str,
    pub file_name: &'a str,
    pub file_path: &'a str,
    pub url: Option<&'a str>,
    pub mime_type: Option<&'a str>,
    pub size_bytes: i64,
    pub metadata: Option<&'a serde_json::Value>,
}

pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, file: &NewFile<'_>) -> Result<FileRecord> {
        let uploaded_at = now_timestamp();
        let metadata = file.metadata.map(|m| m.to_string());

        sqlx::query(
            r#"
            INSERT INTO files (id, user_id, workspace_id, file_name, file_path, url, mime_type, size_bytes, uploaded_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(file.id)
        .bind(file.user_id)
        .bind(file.workspace_id)
        .bind(file.file_name)
        .bind(file.file_path)
        .bind(file.url)
        .bind(file.mime_type)
        .bind(file.size_bytes)
        .bind(&uploaded_at)
        .bind(metadata.as_deref())
        .execute(self.pool)
        .await
        .context("Failed to insert file")?;

        Ok(FileRecord {
            id: file.id.to_string(),
            user_id: file.user_id.to_string(),
            workspace_id: file.workspace_id.to_string(),
            file_name: file.file_name.to_string(),
            file_path: file.file_path.to_string(),
            url: file.url.map(str::to_string),
            mime_type: file.mime_type.map(str::to_string),
            size_bytes: file.size_bytes,
            uploaded_at: parse_db_timestamp(&uploaded_at),
            metadata: file.metadata.cloned(),
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .context("Failed to get file")?;
        Ok(row.map(row_to_file))
    }

    /// Files `user_id` uploaded to the workspace, newest first
    pub async fn list_for_uploader(
        &self,
        workspace_id: &str,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query_as::<_, FileRow>(&format!(
            "{} WHERE workspace_id = ? AND user_id = ? ORDER BY uploaded_at DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(workspace_id)
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await
        .context("Failed to list files")?;
        Ok(rows.into_iter().map(row_to_file).collect())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .context("Failed to delete file")?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_file(row: FileRow) -> FileRecord {
    FileRecord {
        id: row.id,
        user_id: row.user_id,
        workspace_id: row.workspace_id,
        file_name: row.file_name,
        file_path: row.file_path,
        url: row.url,
        mime_type: row.mime_type,
        size_bytes: row.size_bytes,
        uploaded_at: parse_db_timestamp(&row.uploaded_at),
        metadata: row.metadata.and_then(|s| serde_json::from_str(&s).ok()),
    }
}
