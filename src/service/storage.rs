// service/storage.rs
use std::{
    path::{Component, Path, PathBuf},
    sync::OnceLock,
};

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

use crate::error::HttpError;

pub const PROJECT_FILES_FOLDER: &str = "projects/files";
pub const PHOTOS_FOLDER: &str = "signalements/photos";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid file reference: {0}")]
    InvalidReference(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for HttpError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(_) => HttpError::not_found("File not found"),
            StorageError::InvalidReference(_) => HttpError::bad_request("Invalid file reference"),
            StorageError::Io(e) => HttpError::server_error(format!("storage failure: {}", e)),
        }
    }
}

/// Blob storage for uploaded files. References are opaque relative keys.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn save(
        &self,
        folder: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError>;

    async fn read(&self, reference: &str) -> Result<Vec<u8>, StorageError>;

    /// Removing an already-missing file is not an error.
    async fn delete(&self, reference: &str) -> Result<(), StorageError>;
}

/// Best-effort removal of files whose rows are already gone. Failures are
/// logged; the number of files left behind is returned.
pub async fn discard_files(store: &dyn FileStore, references: &[String]) -> usize {
    let mut left = 0;
    for reference in references {
        if let Err(e) = store.delete(reference).await {
            tracing::warn!("Could not remove {}: {}", reference, e);
            left += 1;
        }
    }
    left
}

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid filename regex"))
}

/// Keeps only filesystem-safe characters of a client-supplied name.
pub fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");
    let cleaned = unsafe_chars().replace_all(base, "_");
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

/// File name part of a stored reference, without the uniqueness prefix.
pub fn display_name(reference: &str) -> String {
    let name = reference.rsplit('/').next().unwrap_or(reference);
    match name.split_once('_') {
        Some((prefix, rest)) if Uuid::parse_str(prefix).is_ok() => rest.to_string(),
        _ => name.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFileStore { root: root.into() }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(reference);
        let only_normal = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

        if reference.is_empty() || !only_normal {
            return Err(StorageError::InvalidReference(reference.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(
        &self,
        folder: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let reference = format!("{}/{}_{}", folder, Uuid::new_v4(), sanitize_filename(filename));
        let path = self.resolve(&reference)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!("Stored {} ({} bytes)", reference, bytes.len());
        Ok(reference)
    }

    async fn read(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(reference.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted {}", reference);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("{} already gone", reference);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> LocalFileStore {
        LocalFileStore::new(std::env::temp_dir().join(format!("civic-store-{}", Uuid::new_v4())))
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("rapport final (v2).pdf"), "rapport_final_v2_.pdf");
        assert_eq!(sanitize_filename("..."), "file");
    }

    #[test]
    fn test_display_name_strips_prefix() {
        let reference = format!("projects/files/{}_plan.pdf", Uuid::new_v4());
        assert_eq!(display_name(&reference), "plan.pdf");
        assert_eq!(display_name("legacy.pdf"), "legacy.pdf");
    }

    #[tokio::test]
    async fn test_save_read_delete() {
        let store = temp_store();
        let reference = store.save(PROJECT_FILES_FOLDER, "plan.pdf", b"%PDF").await.unwrap();
        assert!(reference.starts_with("projects/files/"));
        assert!(reference.ends_with("_plan.pdf"));

        assert_eq!(store.read(&reference).await.unwrap(), b"%PDF");

        store.delete(&reference).await.unwrap();
        assert!(matches!(store.read(&reference).await, Err(StorageError::NotFound(_))));
        assert!(store.delete(&reference).await.is_ok());
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let store = temp_store();
        assert!(matches!(
            store.read("../secrets.env").await,
            Err(StorageError::InvalidReference(_))
        ));
        assert!(matches!(
            store.delete("/etc/passwd").await,
            Err(StorageError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn test_discard_files_removes_every_reference() {
        let store = temp_store();
        let first = store.save(PROJECT_FILES_FOLDER, "a.pdf", b"a").await.unwrap();
        let second = store.save(PROJECT_FILES_FOLDER, "b.pdf", b"b").await.unwrap();

        let references = vec![first.clone(), second.clone(), "../outside".to_string()];
        assert_eq!(discard_files(&store, &references).await, 1);
        assert!(matches!(store.read(&first).await, Err(StorageError::NotFound(_))));
        assert!(matches!(store.read(&second).await, Err(StorageError::NotFound(_))));
    }
}
