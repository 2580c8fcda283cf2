//! Reassembling persisted fragments
//!
//! Every block a run produces is written to the store on its own, under
//! `UID-page-block`. The run's key index (page to block indices) is stored
//! under the UID itself and restores document order whatever order the
//! workers finished in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::Store;

/// Part name to extracted value, in part order.
pub type Block = Map<String, Value>;

/// Page number to the indices of the blocks found on that page.
pub type KeyIndex = BTreeMap<usize, Vec<usize>>;

/// Store key of one block fragment.
pub fn fragment_key(uid: &str, page: usize, block: usize) -> String {
    format!("{uid}-{page}-{block}")
}

/// Pages of blocks, both in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub pages: Vec<Vec<Block>>,
}

impl Results {
    pub fn first(&self) -> Option<&Block> {
        self.pages.iter().flatten().next()
    }

    pub fn all_blocks(&self) -> Vec<&Block> {
        self.pages.iter().flatten().collect()
    }
}

/// Read the run `uid` back from the store.
///
/// Blocks that produced nothing were never written and are skipped.
pub async fn assemble(store: &dyn Store, uid: &str) -> Result<Results> {
    let index: KeyIndex = serde_json::from_slice(&store.read(uid).await?)?;

    let mut results = Results::default();
    for (page, blocks) in index {
        let mut page_blocks = Vec::with_capacity(blocks.len());
        for block in blocks {
            let key = fragment_key(uid, page, block);
            match store.read(&key).await {
                Ok(bytes) => page_blocks.push(serde_json::from_slice(&bytes)?),
                Err(StoreError::NotFound(_)) => debug!(%key, "no fragment"),
                Err(e) => return Err(e.into()),
            }
        }
        results.pages.push(page_blocks);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    async fn put(store: &MemoryStore, key: &str, value: Value) {
        store
            .write(key, &serde_json::to_vec(&value).unwrap(), Duration::ZERO)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_assemble_in_index_order() {
        let store = MemoryStore::new();
        // page 1 finished first, block 2 of page 0 produced nothing
        put(&store, "run-1-0", json!({"T_text": "c"})).await;
        put(&store, "run-0-1", json!({"T_text": "b"})).await;
        put(&store, "run-0-0", json!({"T_text": "a"})).await;
        put(&store, "run", json!({"1": [0], "0": [0, 1, 2]})).await;

        let results = assemble(&store, "run").await.unwrap();
        let titles: Vec<_> = results
            .all_blocks()
            .iter()
            .map(|b| b["T_text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
        assert_eq!(results.pages.len(), 2);
        assert_eq!(results.first().unwrap()["T_text"], json!("a"));
    }

    #[tokio::test]
    async fn test_missing_index() {
        let store = MemoryStore::new();
        assert!(assemble(&store, "nope").await.is_err());
    }
}
