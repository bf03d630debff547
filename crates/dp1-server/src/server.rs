use std::future::Future;
use std::sync::Arc;

use dp1_crypto::SigningKey;
use dp1_queue::{MemoryQueue, MessageProcessor, QueueConsumer};
use dp1_store::{FeedStore, InMemoryKvStore, KvStore};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::auth::{AllowAllAuth, ApiKeyAuth, AuthProvider};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::operations::WriteService;
use crate::router::build_router;
use crate::state::AppState;

/// DP-1 feed server: HTTP API plus the queue consumer that persists writes.
pub struct FeedServer {
    config: ServerConfig,
    state: AppState,
    queue: MemoryQueue,
}

impl FeedServer {
    /// Server backed by an in-memory store.
    pub fn new(config: ServerConfig, signer: SigningKey) -> Self {
        Self::with_store(config, signer, Arc::new(InMemoryKvStore::new()))
    }

    pub fn with_store(config: ServerConfig, signer: SigningKey, kv: Arc<dyn KvStore>) -> Self {
        let store = FeedStore::new(kv).with_max_page_size(config.max_page_size);
        let queue = MemoryQueue::with_max_attempts(config.queue.name.clone(), config.queue.max_attempts);
        let writes = WriteService::new(store.clone(), Arc::new(queue.clone()), signer);
        let auth: Arc<dyn AuthProvider> = match &config.api_key {
            Some(key) => Arc::new(ApiKeyAuth::new(key.clone())),
            None => {
                warn!("no API key configured, write endpoints are open");
                Arc::new(AllowAllAuth)
            }
        };
        Self {
            state: AppState::new(store, writes, auth),
            config,
            queue,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn queue(&self) -> &MemoryQueue {
        &self.queue
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Consumer that applies queued writes to this server's store.
    pub fn consumer(&self) -> QueueConsumer {
        QueueConsumer::new(
            Arc::new(self.queue.clone()),
            MessageProcessor::new(self.state.store.clone()),
            self.config.queue.consumer_config(),
        )
    }

    /// Serve requests until `shutdown` resolves, then stop the consumer
    /// after its current batch.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let consumer = tokio::spawn(self.consumer().run(stop_rx));

        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            public_key = %self.state.writes.verifying_key().to_hex(),
            "DP-1 feed listening"
        );
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        self.queue.close();
        let _ = stop_tx.send(true);
        if let Err(e) = consumer.await {
            warn!(error = %e, "queue consumer task failed");
        }
        served
    }
}
