//! Workspace file models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of an uploaded file; the content lives in the storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub user_id: String,
    pub workspace_id: String,
    pub file_name: String,
    pub file_path: String,
    pub url: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Upload query; the request body carries the raw bytes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileQuery {
    #[serde(alias = "file_name", alias = "filename")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilesQuery {
    pub limit: Option<u32>,
}
