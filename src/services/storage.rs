//! File content storage
//!
//! The files table only holds metadata; bytes go through a [`FileStorage`]
//! backend chosen by `storage.backend`. Keys are relative
//! `{workspace_id}/{file_id}_{name}` paths.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{AppInfoConfig, StorageBackend, StorageConfig};
use crate::utils::slugify;

/// Location of freshly stored content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn save(
        &self,
        workspace_id: &str,
        file_id: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<StoredObject>;

    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Readiness check
    async fn ping(&self) -> Result<()>;
}

/// Build the backend selected in `config`
pub fn from_config(config: &StorageConfig, app: &AppInfoConfig) -> Arc<dyn FileStorage> {
    match config.backend {
        StorageBackend::Local => Arc::new(LocalStorage::new(&config.upload_dir, &app.name)),
        StorageBackend::Memory => Arc::new(MemoryStorage::default()),
    }
}

/// Keep the last path segment of an uploaded name, restricted to a safe charset
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

fn object_key(workspace_id: &str, file_id: &str, file_name: &str) -> String {
    format!(
        "{}/{}_{}",
        sanitize_file_name(workspace_id),
        file_id,
        sanitize_file_name(file_name)
    )
}

/// Reject keys that could leave the storage root
fn checked_key(key: &str) -> Result<&Path> {
    let path = Path::new(key);
    if key.is_empty() || !path.components().all(|c| matches!(c, Component::Normal(_))) {
        anyhow::bail!("Invalid storage key: {}", key);
    }
    Ok(path)
}

/// Files on local disk under `{upload_dir}/{app}/files`
pub struct LocalStorage {
    root: PathBuf,
    url_prefix: String,
}

impl LocalStorage {
    pub fn new(upload_dir: &Path, app_name: &str) -> Self {
        let app_dir = match slugify(app_name) {
            s if s.is_empty() => "app".to_string(),
            s => s,
        };
        Self {
            root: upload_dir.join(&app_dir).join("files"),
            url_prefix: format!("/uploads/{}/files", app_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn save(
        &self,
        workspace_id: &str,
        file_id: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<StoredObject> {
        let key = object_key(workspace_id, file_id, file_name);
        let path = self.root.join(checked_key(&key)?);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create upload directory {:?}", parent))?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to save file locally: {:?}", path))?;

        debug!(path = ?path, size = content.len(), "Stored file on disk");
        Ok(StoredObject {
            url: format!("{}/{}", self.url_prefix, key),
            key,
        })
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.root.join(checked_key(key)?);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("File not found on disk: {:?}", path))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.root.join(checked_key(key)?);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete file locally: {:?}", path)),
        }
    }

    async fn ping(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            tokio::fs::create_dir_all(&self.root)
                .await
                .with_context(|| format!("Failed to create upload directory {:?}", self.root))?;
            info!(root = ?self.root, "Created upload directory");
        }
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .with_context(|| format!("Upload directory unavailable: {:?}", self.root))?;
        if metadata.permissions().readonly() {
            anyhow::bail!("Upload directory is read-only: {:?}", self.root);
        }
        Ok(())
    }
}

/// Content kept in process memory
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn save(
        &self,
        workspace_id: &str,
        file_id: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<StoredObject> {
        let key = object_key(workspace_id, file_id, file_name);
        self.objects
            .write()
            .await
            .insert(key.clone(), content.to_vec());
        Ok(StoredObject {
            url: format!("memory://{}", key),
            key,
        })
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .with_context(|| format!("No stored object for key {}", key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
