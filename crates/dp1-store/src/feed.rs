use std::collections::HashSet;
use std::sync::Arc;

use dp1_types::{parse_millis, Channel, Playlist, PlaylistItem, Resource, ResourceKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::index::{scan_prefix, SortOrder, TimeIndex};
use crate::keys;
use crate::traits::{KvStore, ListOptions};

/// Upper bound on the page size any listing will honour.
pub const MAX_PAGE_SIZE: usize = 100;

/// Paging parameters of a listing request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
}

impl ListQuery {
    /// The requested limit clamped to `1..=max`.
    pub fn effective_limit(&self, max: usize) -> usize {
        self.limit.unwrap_or(max).clamp(1, max)
    }
}

/// One page of a listing. `cursor` is the store's own continuation token,
/// passed through unmodified.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub has_more: bool,
}

/// Star flag payload. Remembers the creation time the ordered entries were
/// keyed with so a later removal can address them directly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StarFlag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<String>,
}

/// The feed's storage layout over a [`KvStore`].
///
/// Owns the mapping from playlists, items, channels and stars to physical
/// keys, and keeps every secondary index consistent with the primary
/// records. All writes are unconditional overwrites keyed by resource id, so
/// replaying a write leaves the store unchanged. There is no cross-key
/// transaction: a failure part-way through a write is repaired by retrying
/// the whole write.
#[derive(Clone)]
pub struct FeedStore {
    kv: Arc<dyn KvStore>,
    max_page_size: usize,
}

impl FeedStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(mut self, max: usize) -> Self {
        self.max_page_size = max.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// The underlying key-value provider.
    pub fn kv(&self) -> &dyn KvStore {
        self.kv.as_ref()
    }

    // -----------------------------------------------------------------------
    // Generic record helpers
    // -----------------------------------------------------------------------

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.kv.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::InvalidRecord {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        self.kv.put(key, &raw).await
    }

    fn created_ms(key: &str, created: &str) -> StoreResult<u64> {
        parse_millis(created).map_err(|e| StoreError::InvalidRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Write a resource's primary record, slug mapping and listing entries.
    async fn put_record<R: Resource>(&self, resource: &R) -> StoreResult<()> {
        let id = resource.id();
        let record_key = keys::record(R::KIND, id);
        let created = Self::created_ms(&record_key, resource.created())?;

        self.write_json(&record_key, resource).await?;
        self.kv
            .put(&keys::slug(R::KIND, resource.slug()), &id.to_string())
            .await?;
        keys::created_index(R::KIND).insert(self.kv(), created, id).await
    }

    async fn get_record<R: Resource>(&self, id: Uuid) -> StoreResult<Option<R>> {
        self.read_json(&keys::record(R::KIND, id)).await
    }

    /// Resolve a UUID or slug to a resource id.
    pub async fn resolve_id(&self, kind: ResourceKind, id_or_slug: &str) -> StoreResult<Option<Uuid>> {
        if let Ok(id) = Uuid::parse_str(id_or_slug) {
            return Ok(Some(id));
        }
        match self.kv.get(&keys::slug(kind, id_or_slug)).await? {
            Some(raw) => Uuid::parse_str(&raw).map(Some).map_err(|e| {
                StoreError::InvalidRecord {
                    key: keys::slug(kind, id_or_slug),
                    reason: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    async fn lookup<R: Resource>(&self, id_or_slug: &str) -> StoreResult<Option<R>> {
        match self.resolve_id(R::KIND, id_or_slug).await? {
            Some(id) => self.get_record(id).await,
            None => Ok(None),
        }
    }

    /// Load records for a page of ids, skipping index entries whose record
    /// is missing (left behind by a partially applied write).
    async fn load_records<T: DeserializeOwned>(&self, record_keys: Vec<String>) -> StoreResult<Vec<T>> {
        let raws = self.kv.get_many(&record_keys).await?;
        let mut out = Vec::with_capacity(raws.len());
        for (key, raw) in record_keys.iter().zip(raws) {
            match raw {
                Some(raw) => out.push(serde_json::from_str(&raw).map_err(|e| {
                    StoreError::InvalidRecord {
                        key: key.clone(),
                        reason: e.to_string(),
                    }
                })?),
                None => warn!(%key, "index entry points at a missing record"),
            }
        }
        Ok(out)
    }

    async fn list_indexed<T: DeserializeOwned>(
        &self,
        index: TimeIndex,
        query: &ListQuery,
        record_key: impl Fn(Uuid) -> String,
    ) -> StoreResult<Page<T>> {
        let limit = query.effective_limit(self.max_page_size);
        let page = index
            .page(self.kv(), query.sort, limit, query.cursor.clone())
            .await?;
        let items = self
            .load_records(page.members.into_iter().map(record_key).collect())
            .await?;
        Ok(Page {
            items,
            cursor: page.cursor,
            has_more: !page.is_complete,
        })
    }

    // -----------------------------------------------------------------------
    // Playlists
    // -----------------------------------------------------------------------

    /// Store a playlist together with its items and indices.
    ///
    /// Items still listed in the playlist's item index but absent from this
    /// version are removed along with their index entries. Stale items are
    /// found from the index rather than the previously stored record, so a
    /// retry after a partial write still cleans them up.
    pub async fn put_playlist(&self, playlist: &Playlist) -> StoreResult<()> {
        self.put_record(playlist).await?;

        let items_index = keys::playlist_items_index(playlist.id);
        for item in &playlist.items {
            let item_key = keys::playlist_item(item.id);
            let created = Self::created_ms(&item_key, &item.created)?;
            self.write_json(&item_key, item).await?;
            items_index.insert(self.kv(), created, item.id).await?;
        }

        let current: HashSet<Uuid> = playlist.item_ids().collect();
        let stale: Vec<(String, Uuid)> = items_index
            .entries(self.kv())
            .await?
            .into_iter()
            .filter(|(_, id)| !current.contains(id))
            .collect();
        // Item records first: an index entry left behind by a failure here
        // is what the next attempt finds.
        let stale_items: HashSet<Uuid> = stale.iter().map(|(_, id)| *id).collect();
        for id in &stale_items {
            self.kv.delete(&keys::playlist_item(*id)).await?;
        }
        for (key, _) in &stale {
            self.kv.delete(key).await?;
        }

        debug!(
            playlist_id = %playlist.id,
            items = playlist.items.len(),
            removed = stale_items.len(),
            "playlist stored"
        );
        Ok(())
    }

    /// Fetch a playlist by UUID or slug.
    pub async fn get_playlist(&self, id_or_slug: &str) -> StoreResult<Option<Playlist>> {
        self.lookup(id_or_slug).await
    }

    pub async fn get_playlist_by_id(&self, id: Uuid) -> StoreResult<Option<Playlist>> {
        self.get_record(id).await
    }

    /// List playlists in creation order.
    pub async fn list_playlists(&self, query: &ListQuery) -> StoreResult<Page<Playlist>> {
        self.list_indexed(keys::created_index(ResourceKind::Playlist), query, |id| {
            keys::record(ResourceKind::Playlist, id)
        })
        .await
    }

    /// List playlists referenced by a channel. Returns `None` if the channel
    /// does not exist.
    pub async fn list_playlists_by_channel(
        &self,
        channel: &str,
        query: &ListQuery,
    ) -> StoreResult<Option<Page<Playlist>>> {
        let Some(channel_id) = self.resolve_id(ResourceKind::Channel, channel).await? else {
            return Ok(None);
        };
        if self.get_record::<Channel>(channel_id).await?.is_none() {
            return Ok(None);
        }
        let limit = query.effective_limit(self.max_page_size);
        let result = self
            .kv
            .list(
                ListOptions::prefix(keys::channel_playlists_prefix(channel_id), limit)
                    .with_cursor(query.cursor.clone()),
            )
            .await?;
        let record_keys = result
            .keys
            .iter()
            .filter_map(|k| keys::member_of(k))
            .map(|id| keys::record(ResourceKind::Playlist, id))
            .collect();
        Ok(Some(Page {
            items: self.load_records(record_keys).await?,
            cursor: result.cursor,
            has_more: !result.is_complete,
        }))
    }

    /// Fetch a playlist item by its own UUID.
    pub async fn get_playlist_item(&self, id: Uuid) -> StoreResult<Option<PlaylistItem>> {
        self.read_json(&keys::playlist_item(id)).await
    }

    /// List the items of one playlist in creation order.
    pub async fn list_playlist_items(
        &self,
        playlist_id: Uuid,
        query: &ListQuery,
    ) -> StoreResult<Page<PlaylistItem>> {
        self.list_indexed(keys::playlist_items_index(playlist_id), query, keys::playlist_item)
            .await
    }

    // -----------------------------------------------------------------------
    // Channels
    // -----------------------------------------------------------------------

    /// Store a channel and refresh its playlist membership entries.
    ///
    /// Membership entries under the channel's prefix that the channel no
    /// longer references are deleted.
    pub async fn put_channel(&self, channel: &Channel) -> StoreResult<()> {
        self.put_record(channel).await?;

        let current = channel.referenced_playlist_ids();
        for playlist_id in &current {
            self.kv
                .put(
                    &keys::channel_playlist(channel.id, *playlist_id),
                    &playlist_id.to_string(),
                )
                .await?;
        }
        let stale: Vec<String> = scan_prefix(self.kv(), &keys::channel_playlists_prefix(channel.id))
            .await?
            .into_iter()
            .filter(|k| keys::member_of(k).map_or(true, |id| !current.contains(&id)))
            .collect();
        for key in &stale {
            self.kv.delete(key).await?;
        }

        debug!(
            channel_id = %channel.id,
            playlists = current.len(),
            removed = stale.len(),
            "channel stored"
        );
        Ok(())
    }

    pub async fn get_channel(&self, id_or_slug: &str) -> StoreResult<Option<Channel>> {
        self.lookup(id_or_slug).await
    }

    pub async fn list_channels(&self, query: &ListQuery) -> StoreResult<Page<Channel>> {
        self.list_indexed(keys::created_index(ResourceKind::Channel), query, |id| {
            keys::record(ResourceKind::Channel, id)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Stars
    // -----------------------------------------------------------------------

    /// Record a star for a playlist.
    ///
    /// The ordered entries are keyed by the playlist's creation time: the
    /// supplied `created`, or the stored playlist's. When neither is known
    /// only the flag is written.
    pub async fn star_playlist(&self, playlist_id: Uuid, created: Option<&str>) -> StoreResult<()> {
        let created = match created {
            Some(c) => Some(c.to_string()),
            None => self
                .get_playlist_by_id(playlist_id)
                .await?
                .map(|p| p.created),
        };

        let flag_key = keys::star_flag(playlist_id);
        let ms = match &created {
            Some(c) => Some(Self::created_ms(&flag_key, c)?),
            None => None,
        };
        self.write_json(&flag_key, &StarFlag { created }).await?;
        if let Some(ms) = ms {
            keys::star_index().insert(self.kv(), ms, playlist_id).await?;
        }
        debug!(%playlist_id, ordered = ms.is_some(), "star recorded");
        Ok(())
    }

    /// Remove a playlist's star.
    ///
    /// The timestamp is taken from `created`, then from the stored flag. If
    /// neither yields one, the ordered index is scanned for entries ending
    /// in the playlist id so no orphan is left behind.
    pub async fn unstar_playlist(&self, playlist_id: Uuid, created: Option<&str>) -> StoreResult<()> {
        let flag_key = keys::star_flag(playlist_id);
        let created = match created {
            Some(c) => Some(c.to_string()),
            None => self
                .read_json::<StarFlag>(&flag_key)
                .await?
                .and_then(|f| f.created),
        };

        let index = keys::star_index();
        match created.as_deref().map(parse_millis) {
            Some(Ok(ms)) => index.remove(self.kv(), ms, playlist_id).await?,
            _ => {
                index.remove_member(self.kv(), playlist_id).await?;
            }
        }
        self.kv.delete(&flag_key).await?;
        debug!(%playlist_id, "star removed");
        Ok(())
    }

    pub async fn is_starred(&self, playlist_id: Uuid) -> StoreResult<bool> {
        Ok(self.kv.get(&keys::star_flag(playlist_id)).await?.is_some())
    }

    /// Starred playlists ordered by playlist creation time.
    pub async fn list_starred(&self, query: &ListQuery) -> StoreResult<Page<Playlist>> {
        self.list_indexed(keys::star_index(), query, |id| {
            keys::record(ResourceKind::Playlist, id)
        })
        .await
    }
}

impl std::fmt::Debug for FeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedStore")
            .field("max_page_size", &self.max_page_size)
            .finish()
    }
}
