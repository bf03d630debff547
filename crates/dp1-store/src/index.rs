use dp1_types::{MAX_TIMESTAMP_MS, TIMESTAMP_WIDTH};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::keys::member_of;
use crate::traits::{KvStore, ListOptions};

/// Page size used while scanning an index for orphaned entries.
const SCAN_PAGE: usize = 100;

/// Scan direction of a time-ordered listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Zero-padded ascending encoding of a timestamp.
pub fn encode_asc(ms: u64) -> String {
    format!("{:0width$}", ms.min(MAX_TIMESTAMP_MS), width = TIMESTAMP_WIDTH)
}

/// Zero-padded descending encoding: `MAX_TIMESTAMP_MS - ms`.
pub fn encode_desc(ms: u64) -> String {
    format!(
        "{:0width$}",
        MAX_TIMESTAMP_MS - ms.min(MAX_TIMESTAMP_MS),
        width = TIMESTAMP_WIDTH
    )
}

/// One page of index members.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexPage {
    pub members: Vec<Uuid>,
    pub cursor: Option<String>,
    pub is_complete: bool,
}

/// A secondary index ordered by creation time.
///
/// Each entry exists as two parallel keys under a common base:
/// `{base}:asc:{ts}:{member}` and `{base}:desc:{MAX-ts}:{member}`. A forward
/// key scan of either prefix yields chronological or reverse-chronological
/// order with no separate sort step. Both keys are written on insert and
/// both are removed on delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeIndex {
    base: String,
}

impl TimeIndex {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn prefix(&self, order: SortOrder) -> String {
        match order {
            SortOrder::Asc => format!("{}:asc:", self.base),
            SortOrder::Desc => format!("{}:desc:", self.base),
        }
    }

    pub fn asc_key(&self, ms: u64, member: Uuid) -> String {
        format!("{}{}:{member}", self.prefix(SortOrder::Asc), encode_asc(ms))
    }

    pub fn desc_key(&self, ms: u64, member: Uuid) -> String {
        format!("{}{}:{member}", self.prefix(SortOrder::Desc), encode_desc(ms))
    }

    /// Write both keyed forms of an entry.
    ///
    /// The two writes run concurrently; both are always attempted and the
    /// first error, if any, is returned.
    pub async fn insert(&self, kv: &dyn KvStore, ms: u64, member: Uuid) -> StoreResult<()> {
        let value = member.to_string();
        let asc = self.asc_key(ms, member);
        let desc = self.desc_key(ms, member);
        let (a, d) = futures::join!(kv.put(&asc, &value), kv.put(&desc, &value));
        a.and(d)
    }

    /// Remove both keyed forms of an entry whose timestamp is known.
    pub async fn remove(&self, kv: &dyn KvStore, ms: u64, member: Uuid) -> StoreResult<()> {
        let asc = self.asc_key(ms, member);
        let desc = self.desc_key(ms, member);
        let (a, d) = futures::join!(kv.delete(&asc), kv.delete(&desc));
        a.and(d)
    }

    /// Every key of both forms, paired with the member it indexes.
    pub async fn entries(&self, kv: &dyn KvStore) -> StoreResult<Vec<(String, Uuid)>> {
        let mut out = Vec::new();
        for order in [SortOrder::Asc, SortOrder::Desc] {
            let keys = scan_prefix(kv, &self.prefix(order)).await?;
            out.extend(keys.into_iter().filter_map(|k| member_of(&k).map(|m| (k, m))));
        }
        Ok(out)
    }

    /// Remove every entry for `member` without knowing its timestamp.
    ///
    /// Scans both the ascending and descending prefixes and deletes keys
    /// whose final segment is `member`. Returns the number of keys removed.
    pub async fn remove_member(&self, kv: &dyn KvStore, member: Uuid) -> StoreResult<usize> {
        let mut removed = 0;
        // Delete after scanning so removals cannot shift the cursor.
        for (key, _) in self.entries(kv).await?.into_iter().filter(|(_, m)| *m == member) {
            kv.delete(&key).await?;
            removed += 1;
        }
        debug!(base = %self.base, %member, removed, "index entries removed by scan");
        Ok(removed)
    }

    /// Read one page of members in the requested order.
    pub async fn page(
        &self,
        kv: &dyn KvStore,
        order: SortOrder,
        limit: usize,
        cursor: Option<String>,
    ) -> StoreResult<IndexPage> {
        let result = kv
            .list(ListOptions::prefix(self.prefix(order), limit).with_cursor(cursor))
            .await?;
        Ok(IndexPage {
            members: result.keys.iter().filter_map(|k| member_of(k)).collect(),
            cursor: result.cursor,
            is_complete: result.is_complete,
        })
    }
}

/// Collect every key under `prefix`, following the cursor page by page.
pub async fn scan_prefix(kv: &dyn KvStore, prefix: &str) -> StoreResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor = None;
    loop {
        let page = kv
            .list(ListOptions::prefix(prefix, SCAN_PAGE).with_cursor(cursor))
            .await?;
        keys.extend(page.keys);
        if page.is_complete || page.cursor.is_none() {
            return Ok(keys);
        }
        cursor = page.cursor;
    }
}
