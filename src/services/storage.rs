use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),
}

/// Blob storage for user uploads (fowl photos, documents).
///
/// Keys are `/`-separated; prefixes name a "folder" such as `users/{id}/`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    /// Deletes every object under `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StorageError>;
    async fn ping(&self) -> Result<(), StorageError>;
}

pub fn user_prefix(user_id: uuid::Uuid) -> String {
    format!("users/{}/", user_id)
}

pub fn fowl_prefix(fowl_id: uuid::Uuid) -> String {
    format!("fowls/{}/", fowl_id)
}

fn validate_key(key: &str) -> Result<&str, StorageError> {
    let trimmed = key.trim_matches('/');
    let escapes = Path::new(trimmed)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if trimmed.is_empty() || escapes {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(trimmed)
}

/// Object store rooted at a local directory.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(validate_key(key)?))
    }
}

async fn count_files(dir: &Path) -> Result<u64, std::io::Error> {
    let mut count = 0;
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                pending.push(entry.path());
            } else {
                count += 1;
            }
        }
    }
    Ok(count)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StorageError> {
        let path = self.path_for(prefix)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            let removed = count_files(&path).await?;
            tokio::fs::remove_dir_all(&path).await?;
            Ok(removed)
        } else {
            tokio::fs::remove_file(&path).await?;
            Ok(1)
        }
    }

    async fn ping(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }
}

/// In-memory object store (intended for tests).
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let key = validate_key(key)?.to_string();
        self.objects.write().await.insert(key, bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = validate_key(key)?;
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StorageError> {
        let folder = format!("{}/", validate_key(prefix)?);
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(&folder));
        Ok((before - objects.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_escaping_keys() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("users/../../x").is_err());
        assert!(validate_key("/").is_err());
        assert_eq!(validate_key("/users/a/b.jpg").unwrap(), "users/a/b.jpg");
    }

    #[tokio::test]
    async fn test_memory_delete_prefix_only_touches_folder() {
        let store = MemoryObjectStore::default();
        store.put("users/abc/avatar.jpg", vec![1]).await.unwrap();
        store.put("users/abc/docs/id.pdf", vec![2]).await.unwrap();
        store.put("users/abcd/avatar.jpg", vec![3]).await.unwrap();

        let removed = store.delete_prefix("users/abc/").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.keys().await, vec!["users/abcd/avatar.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_local_store_roundtrip_and_delete() {
        let root = std::env::temp_dir().join(format!("fowlmart-storage-{}", uuid::Uuid::new_v4()));
        let store = LocalObjectStore::new(&root);

        store.put("fowls/f1/photo.jpg", b"jpg".to_vec()).await.unwrap();
        store.put("fowls/f1/thumbs/small.jpg", b"s".to_vec()).await.unwrap();
        assert_eq!(
            store.get("fowls/f1/photo.jpg").await.unwrap().as_deref(),
            Some(&b"jpg"[..])
        );

        assert_eq!(store.delete_prefix("fowls/f1/").await.unwrap(), 2);
        assert!(store.get("fowls/f1/photo.jpg").await.unwrap().is_none());
        assert_eq!(store.delete_prefix("fowls/missing/").await.unwrap(), 0);

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
