use super::{ KeyValueStore, StoreError };
use async_trait::async_trait;
use log::warn;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

/// File-backed key-value store: one JSON object on disk holding the whole
/// key→value map, rewritten on every mutation. The direct analog of the
/// original's localStorage blob.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles against the single backing file.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_map(&self) -> Result<HashMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) =>
                serde_json
                    ::from_str(&raw)
                    .map_err(|e| {
                        warn!("Store file {} is corrupt: {}", self.path.display(), e);
                        StoreError::Backend(format!("corrupt store file: {}", e))
                    }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn write_map(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).await.map_err(|e| StoreError::Backend(e.to_string()))?;
            }
        }
        let encoded = serde_json::to_string(map)?;
        fs::write(&self.path, encoded).await.map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let map = self.read_map().await?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.remove(key);
        self.write_map(&map).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::new(path.clone());
        store.set("tree:default", "{\"a\":1}").await.unwrap();
        store.set("backup:default", "{}").await.unwrap();
        drop(store);

        let reopened = FileStore::new(path);
        assert_eq!(
            reopened.get("tree:default").await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        reopened.remove("backup:default").await.unwrap();
        assert!(reopened.get("backup:default").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("never_written.json"));
        assert!(store.get("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/deeper/store.json"));
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn corrupt_file_surfaces_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, "not json at all").await.unwrap();
        let store = FileStore::new(path);
        assert!(matches!(store.get("k").await, Err(StoreError::Backend(_))));
    }
}
