use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::Store;
use crate::error::StoreError;

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// In-process store. Used by tests and single-run tooling; contents are
/// lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items, expired ones included.
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Io(std::io::Error::other("memory store lock poisoned"))
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        items
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn write(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn expired(&self, key: &str) -> bool {
        let Ok(items) = self.items.read() else {
            return true;
        };
        match items.get(key) {
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => Instant::now() >= *at,
            Some(_) => false,
            None => true,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.items.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.items.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}
