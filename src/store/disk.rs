use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use super::Store;
use crate::error::StoreError;

const TTL_DIR: &str = ".ttl";

/// One file per key under a base directory. Expiry timestamps (unix
/// seconds) live in a `.ttl` subdirectory next to the values.
#[derive(Debug, Clone)]
pub struct DiskStore {
    base_dir: PathBuf,
}

impl DiskStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn value_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.base_dir.join(key))
    }

    fn ttl_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.base_dir.join(TTL_DIR).join(key))
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('.')
        || key.contains(|c: char| c == '/' || c == '\\' || c.is_control());
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[async_trait]
impl Store for DiskStore {
    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.value_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let path = self.value_path(key)?;
        let ttl_path = self.ttl_path(key)?;
        tokio::fs::create_dir_all(self.base_dir.join(TTL_DIR)).await?;
        tokio::fs::write(&path, value).await?;
        if ttl.is_zero() {
            remove_if_present(&ttl_path).await?;
        } else {
            let expires = unix_now() + ttl.as_secs().max(1);
            tokio::fs::write(&ttl_path, expires.to_string()).await?;
        }
        Ok(())
    }

    async fn expired(&self, key: &str) -> bool {
        let (Ok(path), Ok(ttl_path)) = (self.value_path(key), self.ttl_path(key)) else {
            return true;
        };
        if tokio::fs::metadata(&path).await.is_err() {
            return true;
        }
        match tokio::fs::read_to_string(&ttl_path).await {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(|expires| unix_now() >= expires)
                .unwrap_or(true),
            Err(_) => false,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        remove_if_present(&self.value_path(key)?).await?;
        remove_if_present(&self.ttl_path(key)?).await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_dir_all(&self.base_dir).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> DiskStore {
        let dir = std::env::temp_dir().join(format!("scrape-kit-{}", uuid::Uuid::new_v4()));
        DiskStore::new(dir)
    }

    #[tokio::test]
    async fn test_disk_round_trip() {
        let store = temp_store();
        store.write("abc-0-1", b"{\"a\":1}", Duration::ZERO).await.unwrap();
        assert_eq!(store.read("abc-0-1").await.unwrap(), b"{\"a\":1}");
        assert!(!store.expired("abc-0-1").await);

        store.delete("abc-0-1").await.unwrap();
        assert!(matches!(store.read("abc-0-1").await, Err(StoreError::NotFound(_))));
        store.delete_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_disk_ttl_written() {
        let store = temp_store();
        store
            .write("page", b"<html></html>", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(!store.expired("page").await);
        assert!(store.expired("missing").await);
        store.delete_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_keys() {
        let store = temp_store();
        let err = store.write("../etc", b"x", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
