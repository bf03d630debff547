//! Key-value storage layout for the DP-1 feed.
//!
//! The feed persists everything through a minimal key-value provider
//! ([`KvStore`]: get, put, delete, prefix list). On top of it this crate
//! defines the physical key layout ([`keys`]), time-ordered secondary
//! indices ([`TimeIndex`]) and the [`FeedStore`] that keeps playlists,
//! items, channels and stars consistent with their indices.
//!
//! # Storage Backends
//!
//! - [`InMemoryKvStore`] -- `BTreeMap`-based store for tests and single-process use
//!
//! # Design Rules
//!
//! 1. Every write is an unconditional overwrite keyed by resource id, so
//!    replaying a write is a no-op.
//! 2. Ordered index entries exist in an ascending and a descending form;
//!    both are written and both are removed together.
//! 3. Listing cursors come from the backend and are passed through as-is.
//! 4. Backend errors are propagated, never silently ignored.

pub mod error;
pub mod feed;
pub mod index;
pub mod keys;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use feed::{FeedStore, ListQuery, Page, MAX_PAGE_SIZE};
pub use index::{encode_asc, encode_desc, IndexPage, SortOrder, TimeIndex};
pub use memory::InMemoryKvStore;
pub use traits::{KvStore, ListOptions, ListResult};
