use async_trait::async_trait;

use crate::error::StoreResult;

/// Parameters of a prefix listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Opaque continuation token from a previous [`ListResult`].
    pub cursor: Option<String>,
    /// Maximum number of keys to return.
    pub limit: usize,
}

impl ListOptions {
    pub fn prefix(prefix: impl Into<String>, limit: usize) -> Self {
        Self {
            prefix: prefix.into(),
            cursor: None,
            limit,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// One page of keys from a prefix listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListResult {
    /// Matching keys in lexicographic order.
    pub keys: Vec<String>,
    /// Token for the next page. `None` once the listing is complete.
    pub cursor: Option<String>,
    pub is_complete: bool,
}

/// Key-value provider the feed's storage layout is built on.
///
/// Implementations must satisfy these invariants:
/// - `put` is an unconditional overwrite; writing the same value twice
///   leaves the store unchanged.
/// - `delete` of a missing key succeeds.
/// - `list` returns keys in lexicographic byte order, and its cursor is
///   opaque to callers.
/// - All backend errors are propagated, never silently ignored.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write (create or replace) a value.
    async fn put(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove a key.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// List keys under a prefix, one page at a time.
    async fn list(&self, options: ListOptions) -> StoreResult<ListResult>;

    /// Read several values.
    ///
    /// Default implementation calls `get()` for each key. Backends may
    /// override for fewer round-trips.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }
}
