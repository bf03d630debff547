//! Resource types for the DP-1 feed.
//!
//! Playlists and channels are versioned documents signed by the feed
//! operator. This crate holds their wire shapes, the client-facing create and
//! update bodies, and the helpers that assign server-owned fields.
//!
//! # Key Types
//!
//! - [`Playlist`] / [`PlaylistItem`] -- an ordered list of artworks
//! - [`Channel`] -- a curated set of playlist URLs
//! - [`Resource`] -- behaviour shared by signed top-level resources
//!
//! Server-owned fields (`id`, `slug`, `created`, `signature`) are never
//! accepted from clients: every input type denies unknown fields.

pub mod channel;
pub mod error;
pub mod playlist;
pub mod resource;
pub mod slug;
pub mod temporal;

pub use channel::{playlist_id_from_url, Channel, ChannelInput, ChannelUpdate};
pub use error::{TypeError, TypeResult};
pub use playlist::{
    DisplayPrefs, License, Playlist, PlaylistDefaults, PlaylistInput, PlaylistItem,
    PlaylistItemInput, PlaylistUpdate, Provenance,
};
pub use resource::{Resource, ResourceKind, PROTECTED_FIELDS};
pub use slug::{generate_slug, is_valid_slug};
pub use temporal::{
    iso_from_millis, now_millis, parse_millis, ItemClock, MAX_TIMESTAMP_MS, TIMESTAMP_WIDTH,
};
