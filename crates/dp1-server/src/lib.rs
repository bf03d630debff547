//! HTTP server for the DP-1 feed.
//!
//! Serves playlists and channels over a small REST API. Reads come straight
//! from the feed store. Writes are validated, signed, and enqueued by the
//! [`WriteService`]; the response carries the signed resource and a
//! background consumer persists it.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod operations;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{Action, AllowAllAuth, ApiKeyAuth, AuthProvider, Credentials, Identity, WriteAccess};
pub use config::{QueueConfig, ServerConfig, API_KEY_VAR};
pub use error::{ServerError, ServerResult};
pub use handler::{ApiJson, ApiQuery, FactInput};
pub use operations::WriteService;
pub use server::FeedServer;
pub use state::AppState;
