//! Key/value storage for block fragments, key indexes and cached pages.
//!
//! Every implementation must tolerate concurrent writes from many block
//! workers; fragment keys never overlap, so no cross-key coordination is
//! needed.

mod disk;
mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, StoreError};

#[async_trait]
pub trait Store: Send + Sync {
    /// Read the value stored under `key`.
    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Write `value` under `key`. A zero `ttl` never expires.
    async fn write(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Whether `key` is missing or past its TTL.
    async fn expired(&self, key: &str) -> bool;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Erase every item in the store.
    async fn delete_all(&self) -> Result<(), StoreError>;
}

/// Available storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Memory,
    Disk,
    S3,
    Spaces,
    Redis,
}

impl FromStr for StorageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageType::Memory),
            "disk" | "diskv" => Ok(StorageType::Disk),
            "s3" => Ok(StorageType::S3),
            "spaces" => Ok(StorageType::Spaces),
            "redis" => Ok(StorageType::Redis),
            other => Err(Error::Config(format!("unknown storage type: {other}"))),
        }
    }
}

/// Build the store selected by `config.storage_type`.
pub fn new_store(config: &Config) -> Result<Arc<dyn Store>, StoreError> {
    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageType::Disk => Ok(Arc::new(DiskStore::new(&config.storage_dir))),
        other => Err(StoreError::Unsupported(format!("{other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_storage_type() {
        assert_eq!("Diskv".parse::<StorageType>().unwrap(), StorageType::Disk);
        assert_eq!("memory".parse::<StorageType>().unwrap(), StorageType::Memory);
        assert!("floppy".parse::<StorageType>().is_err());
    }

    #[test]
    fn test_unsupported_backend() {
        let config = Config::default().with_storage(StorageType::Redis);
        assert!(matches!(new_store(&config), Err(StoreError::Unsupported(_))));
    }
}
