//! Key-value credential store
//!
//! Process-wide string storage with no transactional guarantees. Holds the
//! auth token and the keep-alive liveness timestamp.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const LIVENESS_KEY: &str = "lastHeartbeat";

#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Store persisted as a flat JSON object on disk
///
/// The whole file is rewritten on every change, through a sibling temp
/// file that is renamed over the target.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt store file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        debug!("Opened store {} ({} keys)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create store directory")?;
        }
        let bytes = serde_json::to_vec_pretty(entries)?;
        let staging = self.staging_path();
        tokio::fs::write(&staging, bytes)
            .await
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))
    }

    fn staging_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_some() {
            self.flush(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_set_get_remove() -> Result<()> {
        let store = MemoryStore::new();
        assert_eq!(store.get(AUTH_TOKEN_KEY).await?, None);

        store.set(AUTH_TOKEN_KEY, "secret").await?;
        assert_eq!(store.get(AUTH_TOKEN_KEY).await?.as_deref(), Some("secret"));

        store.remove(AUTH_TOKEN_KEY).await?;
        assert_eq!(store.get(AUTH_TOKEN_KEY).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("store.json");

        {
            let store = FileStore::open(&path).await?;
            store.set(LIVENESS_KEY, "2025-10-27T14:30:00Z").await?;
        }

        let reopened = FileStore::open(&path).await?;
        assert_eq!(
            reopened.get(LIVENESS_KEY).await?.as_deref(),
            Some("2025-10-27T14:30:00Z")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_leaves_no_staging_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("store.json");

        let store = FileStore::open(&path).await?;
        store.set(AUTH_TOKEN_KEY, "secret").await?;
        store.set(LIVENESS_KEY, "2025-10-27T14:30:00Z").await?;
        store.remove(AUTH_TOKEN_KEY).await?;

        assert!(!store.staging_path().exists());
        let names: Vec<_> = std::fs::read_dir(temp_dir.path())?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<std::io::Result<_>>()?;
        assert_eq!(names, vec![std::ffi::OsString::from("store.json")]);

        let on_disk: BTreeMap<String, String> = serde_json::from_slice(&std::fs::read(&path)?)?;
        assert_eq!(on_disk.len(), 1);
        assert!(on_disk.contains_key(LIVENESS_KEY));
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_staging_file_does_not_break_open() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, r#"{"authToken":"kept"}"#)?;
        // Leftover from a write that never reached the rename
        std::fs::write(temp_dir.path().join("store.tmp"), r#"{"authTo"#)?;

        let store = FileStore::open(&path).await?;
        assert_eq!(store.get(AUTH_TOKEN_KEY).await?.as_deref(), Some("kept"));

        store.set(LIVENESS_KEY, "2025-10-27T14:30:00Z").await?;
        assert!(!temp_dir.path().join("store.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "not json")?;

        assert!(FileStore::open(&path).await.is_err());
        Ok(())
    }
}
