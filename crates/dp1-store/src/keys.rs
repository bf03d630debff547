//! Key layout of the feed in the key-value store.
//!
//! ```text
//! dp1:{kind}:{uuid}                                   primary record (JSON)
//! dp1:{kind}:slug:{slug}                              slug -> uuid
//! dp1:playlist-item:{uuid}                            item record (JSON)
//! dp1:index:{kind}:created:{asc|desc}:{ts}:{uuid}     listing order
//! dp1:index:playlist-items:{pid}:{asc|desc}:{ts}:{id} items of a playlist
//! dp1:index:channel-playlists:{cid}:{pid}             channel membership
//! dp1:star:playlist:{pid}                             star flag
//! dp1:star:playlist:{asc|desc}:{ts}:{pid}             stars by playlist creation
//! ```
//!
//! `{ts}` is a zero-padded 13-digit epoch-millisecond value; the descending
//! form stores `MAX_TIMESTAMP_MS - ts` so a forward scan yields newest first.

use dp1_types::ResourceKind;
use uuid::Uuid;

use crate::index::TimeIndex;

/// Fixed prefix shared by every key the feed writes.
pub const NAMESPACE: &str = "dp1";

/// Primary record key for a playlist or channel.
pub fn record(kind: ResourceKind, id: Uuid) -> String {
    format!("{NAMESPACE}:{kind}:{id}")
}

/// Secondary key mapping a slug to its resource UUID.
pub fn slug(kind: ResourceKind, slug: &str) -> String {
    format!("{NAMESPACE}:{kind}:slug:{slug}")
}

/// Primary record key for a playlist item.
pub fn playlist_item(id: Uuid) -> String {
    format!("{NAMESPACE}:playlist-item:{id}")
}

/// Creation-time listing index for a resource kind.
pub fn created_index(kind: ResourceKind) -> TimeIndex {
    TimeIndex::new(format!("{NAMESPACE}:index:{kind}:created"))
}

/// Creation-ordered items of one playlist.
pub fn playlist_items_index(playlist_id: Uuid) -> TimeIndex {
    TimeIndex::new(format!("{NAMESPACE}:index:playlist-items:{playlist_id}"))
}

/// Prefix of all membership entries for one channel.
pub fn channel_playlists_prefix(channel_id: Uuid) -> String {
    format!("{NAMESPACE}:index:channel-playlists:{channel_id}:")
}

/// Membership entry recording that a channel references a playlist.
pub fn channel_playlist(channel_id: Uuid, playlist_id: Uuid) -> String {
    format!("{}{playlist_id}", channel_playlists_prefix(channel_id))
}

const STAR_BASE: &str = "dp1:star:playlist";

/// Unconditional "this playlist is starred" flag.
pub fn star_flag(playlist_id: Uuid) -> String {
    format!("{STAR_BASE}:{playlist_id}")
}

/// Star entries ordered by the starred playlist's creation time.
pub fn star_index() -> TimeIndex {
    TimeIndex::new(STAR_BASE)
}

/// Last `:`-separated segment of a key, which for every index entry is the
/// member's UUID.
pub fn member_of(key: &str) -> Option<Uuid> {
    key.rsplit(':').next().and_then(|s| Uuid::parse_str(s).ok())
}
