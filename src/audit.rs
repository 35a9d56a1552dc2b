//! Audit persistence (spec.md §4.6): a byte-exact copy of every ingested
//! file, addressed by hostname and date so operators can reconstruct what
//! the gateway saw. Must succeed before remote cleanup is permitted — the
//! scheduler enforces that ordering, not this module.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Datelike, Local};

use crate::error::AuditError;

/// Storage backend for audit copies, addressed by an opaque key. Swappable
/// so a deployment can back this with local disk, an object store, or
/// anything else without touching `AuditSaver`.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, AuditError>;
    async fn put(&self, key: &str, contents: &[u8]) -> Result<(), AuditError>;
}

/// Filesystem-backed `AuditStore` rooted at a configured directory.
pub struct FilesystemAuditStore {
    root: PathBuf,
}

impl FilesystemAuditStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AuditStore for FilesystemAuditStore {
    async fn exists(&self, key: &str) -> Result<bool, AuditError> {
        Ok(self.root.join(key).exists())
    }

    async fn put(&self, key: &str, contents: &[u8]) -> Result<(), AuditError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| save_err(key, e))?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| save_err(key, e))
    }
}

fn save_err(key: &str, source: impl std::error::Error + Send + Sync + 'static) -> AuditError {
    AuditError::Save {
        filename: Path::new(key)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        key: key.to_string(),
        source: eyre::Report::new(source),
    }
}

/// Saves one file at a time, keyed by `{hostname}/{yyyy}/{mm}/{dd}/{basename}`
/// with a numeric suffix on collision.
pub struct AuditSaver {
    store: Box<dyn AuditStore>,
    hostname: String,
}

impl AuditSaver {
    pub fn new(store: Box<dyn AuditStore>, hostname: impl Into<String>) -> Self {
        Self {
            store,
            hostname: hostname.into(),
        }
    }

    /// Saves `contents` under today's date, returning the key it was stored
    /// at.
    pub async fn save(&self, basename: &str, contents: &[u8]) -> Result<String, AuditError> {
        let now = Local::now();
        let prefix = format!(
            "{}/{}/{:02}/{:02}",
            self.hostname,
            now.format("%Y"),
            now.month(),
            now.day()
        );

        let mut key = format!("{prefix}/{basename}");
        let mut attempt = 1u32;
        while self.store.exists(&key).await? {
            let (stem, ext) = split_ext(basename);
            key = match ext {
                Some(ext) => format!("{prefix}/{stem}-{attempt}.{ext}"),
                None => format!("{prefix}/{stem}-{attempt}"),
            };
            attempt += 1;
        }

        self.store.put(&key, contents).await?;
        Ok(key)
    }
}

fn split_ext(basename: &str) -> (&str, Option<&str>) {
    match basename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (basename, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_writes_byte_exact_copy_at_the_expected_key() {
        let dir = tempdir().unwrap();
        let store = FilesystemAuditStore::new(dir.path());
        let saver = AuditSaver::new(Box::new(store), "bank.example.com");

        let key = saver.save("prenote.ach", b"hello world").await.unwrap();
        assert!(key.starts_with("bank.example.com/"));
        assert!(key.ends_with("prenote.ach"));

        let written = tokio::fs::read(dir.path().join(&key)).await.unwrap();
        assert_eq!(written, b"hello world");
    }

    #[tokio::test]
    async fn collisions_get_a_numeric_suffix() {
        let dir = tempdir().unwrap();
        let store = FilesystemAuditStore::new(dir.path());
        let saver = AuditSaver::new(Box::new(store), "bank.example.com");

        let first = saver.save("prenote.ach", b"one").await.unwrap();
        let second = saver.save("prenote.ach", b"two").await.unwrap();
        assert_ne!(first, second);
        assert!(second.contains("prenote-1"));
    }
}
