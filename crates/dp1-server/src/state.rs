use std::sync::Arc;

use dp1_store::FeedStore;

use crate::auth::AuthProvider;
use crate::operations::WriteService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: FeedStore,
    pub writes: WriteService,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(store: FeedStore, writes: WriteService, auth: Arc<dyn AuthProvider>) -> Self {
        Self { store, writes, auth }
    }
}
