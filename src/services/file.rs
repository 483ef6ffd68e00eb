//! Workspace files
//!
//! Metadata lives in the `files` table and content in the configured
//! [`FileStorage`]. Only the uploader may download a file; the uploader or
//! a workspace OWNER/ADMIN may delete it.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{file_repository::NewFile, DbPool, FileRepository};
use crate::models::FileRecord;
use crate::services::audit::{events, record_event};
use crate::services::storage::FileStorage;
use crate::utils::AppError;

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 200;

const NOT_FOUND: &str = "File not found";

/// Uploaded content plus what the client said about it
#[derive(Debug, Clone)]
pub struct Upload<'a> {
    pub file_name: &'a str,
    pub mime_type: Option<&'a str>,
    pub content: &'a [u8],
}

/// Stored file ready to be streamed back
#[derive(Debug, Clone)]
pub struct Download {
    pub file: FileRecord,
    pub content: Vec<u8>,
}

#[derive(Clone)]
pub struct FileService {
    db: DbPool,
    storage: Arc<dyn FileStorage>,
}

impl FileService {
    pub fn new(db: DbPool, storage: Arc<dyn FileStorage>) -> Self {
        Self { db, storage }
    }

    pub async fn upload(
        &self,
        workspace_id: &str,
        user_id: &str,
        upload: &Upload<'_>,
    ) -> Result<FileRecord, AppError> {
        let file_name = upload.file_name.trim();
        if file_name.is_empty() {
            return Err(AppError::bad_request("fileName is required"));
        }
        if upload.content.is_empty() {
            return Err(AppError::bad_request("No file uploaded"));
        }

        let id = Uuid::new_v4().to_string();
        let stored = self
            .storage
            .save(workspace_id, &id, file_name, upload.content)
            .await
            .map_err(|e| {
                error!(error = %format!("{:#}", e), workspace_id = %workspace_id, "File save failed");
                AppError::internal("Failed to store file")
            })?;

        let inserted = FileRepository::new(&self.db)
            .insert(&NewFile {
                id: &id,
                user_id,
                workspace_id,
                file_name,
                file_path: &stored.key,
                url: Some(&stored.url),
                mime_type: upload.mime_type,
                size_bytes: upload.content.len() as i64,
                metadata: None,
            })
            .await;
        let file = match inserted {
            Ok(file) => file,
            Err(e) => {
                // Do not leave orphaned content behind
                if let Err(cleanup) = self.storage.delete(&stored.key).await {
                    warn!(error = %cleanup, key = %stored.key, "Failed to clean up stored file");
                }
                return Err(e.into());
            }
        };

        info!(
            file_id = %file.id,
            workspace_id = %workspace_id,
            user_id = %user_id,
            size = file.size_bytes,
            "File uploaded"
        );
        record_event(
            &self.db,
            events::FILE_UPLOADED,
            Some(user_id),
            Some(workspace_id),
            json!({ "file_id": file.id, "file_name": file.file_name, "size_bytes": file.size_bytes }),
        )
        .await;

        Ok(file)
    }

    /// The caller's own uploads in the workspace, newest first
    pub async fn list(
        &self,
        workspace_id: &str,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<FileRecord>, AppError> {
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT);
        Ok(FileRepository::new(&self.db)
            .list_for_uploader(workspace_id, user_id, limit)
            .await?)
    }

    pub async fn download(
        &self,
        workspace_id: &str,
        file_id: &str,
        user_id: &str,
    ) -> Result<Download, AppError> {
        let file = self.find(file_id).await?;
        if file.workspace_id != workspace_id || file.user_id != user_id {
            warn!(
                file_id = %file_id,
                user_id = %user_id,
                workspace_id = %workspace_id,
                "Unauthorized file access attempt"
            );
            return Err(AppError::forbidden("Unauthorized"));
        }

        let content = self.storage.read(&file.file_path).await.map_err(|e| {
            error!(error = %format!("{:#}", e), file_id = %file_id, "File content missing");
            AppError::internal("File content unavailable")
        })?;

        info!(file_id = %file_id, user_id = %user_id, workspace_id = %workspace_id, "File download");
        Ok(Download { file, content })
    }

    /// `is_workspace_admin` lets OWNER/ADMIN remove other members' uploads
    pub async fn delete(
        &self,
        workspace_id: &str,
        file_id: &str,
        user_id: &str,
        is_workspace_admin: bool,
    ) -> Result<(), AppError> {
        let file = self.find(file_id).await?;
        if file.workspace_id != workspace_id {
            warn!(
                file_id = %file_id,
                workspace_id = %workspace_id,
                "File delete refused: workspace mismatch"
            );
            return Err(AppError::forbidden("File does not belong to this workspace"));
        }
        if file.user_id != user_id && !is_workspace_admin {
            return Err(AppError::forbidden(
                "Only the uploader or a workspace admin can delete this file",
            ));
        }

        // A storage failure still removes the row
        if let Err(e) = self.storage.delete(&file.file_path).await {
            error!(error = %format!("{:#}", e), file_id = %file_id, "File storage delete failed");
        }
        FileRepository::new(&self.db).delete(file_id).await?;

        info!(file_id = %file_id, user_id = %user_id, workspace_id = %workspace_id, "File deleted");
        record_event(
            &self.db,
            events::FILE_DELETED,
            Some(user_id),
            Some(workspace_id),
            json!({ "file_id": file_id, "file_name": file.file_name }),
        )
        .await;
        Ok(())
    }

    async fn find(&self, file_id: &str) -> Result<FileRecord, AppError> {
        FileRepository::new(&self.db)
            .get(file_id)
            .await?
            .ok_or_else(|| AppError::not_found(NOT_FOUND))
    }
}
