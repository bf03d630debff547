use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::traits::{KvStore, ListOptions, ListResult};

/// Page size used when a listing does not specify one.
const DEFAULT_LIST_LIMIT: usize = 1000;

/// In-memory, `BTreeMap`-based key-value store.
///
/// Intended for tests and single-process deployments. Keys are kept sorted,
/// so prefix listings come back in lexicographic order. The listing cursor
/// is the last key of the previous page.
pub struct InMemoryKvStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the full contents, for comparing store states in tests.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().map(|m| m.clone()).unwrap_or_default()
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("in-memory store lock poisoned".into())
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let map = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut map = self.entries.write().map_err(|_| Self::poisoned())?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut map = self.entries.write().map_err(|_| Self::poisoned())?;
        map.remove(key);
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> StoreResult<ListResult> {
        let limit = if options.limit == 0 {
            DEFAULT_LIST_LIMIT
        } else {
            options.limit
        };
        let map = self.entries.read().map_err(|_| Self::poisoned())?;

        let start = match &options.cursor {
            Some(after) if after.as_str() >= options.prefix.as_str() => {
                Bound::Excluded(after.clone())
            }
            _ => Bound::Included(options.prefix.clone()),
        };

        let mut keys: Vec<String> = map
            .range((start, Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(&options.prefix))
            .take(limit + 1)
            .cloned()
            .collect();

        let is_complete = keys.len() <= limit;
        keys.truncate(limit);
        let cursor = if is_complete { None } else { keys.last().cloned() };

        Ok(ListResult {
            keys,
            cursor,
            is_complete,
        })
    }
}

impl std::fmt::Debug for InMemoryKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKvStore")
            .field("key_count", &self.len())
            .finish()
    }
}
