use std::sync::Arc;

use dp1_crypto::{SigningKey, VerifyingKey};
use dp1_queue::{
    Fact, FactKind, FactStatus, Queue, QueueError, SendOptions, WriteMessage, WriteOperation,
};
use dp1_store::FeedStore;
use dp1_types::{
    now_millis, Channel, ChannelInput, ChannelUpdate, Playlist, PlaylistInput, PlaylistUpdate,
    Resource,
};
use tracing::info;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};

/// Request-side half of the write pipeline.
///
/// Each write is validated, built with server-owned fields, signed, and
/// enqueued. The signed resource is returned to the caller before it is
/// persisted; if the enqueue fails the request fails, since nothing was
/// durably queued.
#[derive(Clone)]
pub struct WriteService {
    store: FeedStore,
    queue: Arc<dyn Queue>,
    signer: Arc<SigningKey>,
}

impl WriteService {
    pub fn new(store: FeedStore, queue: Arc<dyn Queue>, signer: SigningKey) -> Self {
        Self {
            store,
            queue,
            signer: Arc::new(signer),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signer.verifying_key()
    }

    pub async fn create_playlist(&self, input: PlaylistInput) -> ServerResult<Playlist> {
        input.validate()?;
        let playlist = self.signed(Playlist::from_input(input, now_millis()))?;
        self.enqueue(WriteOperation::CreatePlaylist(playlist.clone())).await?;
        Ok(playlist)
    }

    pub async fn update_playlist(&self, id_or_slug: &str, update: PlaylistUpdate) -> ServerResult<Playlist> {
        update.validate()?;
        if update.is_empty() {
            return Err(ServerError::Validation("update contains no fields".into()));
        }
        let existing = self
            .store
            .get_playlist(id_or_slug)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("playlist {id_or_slug}")))?;
        let playlist = self.signed(existing.apply_update(update, now_millis()))?;
        self.enqueue(WriteOperation::UpdatePlaylist(playlist.clone())).await?;
        Ok(playlist)
    }

    pub async fn create_channel(&self, input: ChannelInput) -> ServerResult<Channel> {
        input.validate()?;
        let channel = self.signed(Channel::from_input(input, now_millis()))?;
        self.enqueue(WriteOperation::CreateChannel(channel.clone())).await?;
        Ok(channel)
    }

    pub async fn update_channel(&self, id_or_slug: &str, update: ChannelUpdate) -> ServerResult<Channel> {
        update.validate()?;
        if update.is_empty() {
            return Err(ServerError::Validation("update contains no fields".into()));
        }
        let existing = self
            .store
            .get_channel(id_or_slug)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("channel {id_or_slug}")))?;
        let channel = self.signed(existing.apply_update(update))?;
        self.enqueue(WriteOperation::UpdateChannel(channel.clone())).await?;
        Ok(channel)
    }

    /// Enqueue a star fact for a playlist, as received on `POST /facts`.
    /// The playlist's creation time is attached when the playlist is
    /// already stored.
    pub async fn record_star(&self, playlist_id: Uuid, status: FactStatus) -> ServerResult<Fact> {
        let created = self
            .store
            .get_playlist_by_id(playlist_id)
            .await?
            .map(|p| p.created);
        let fact = Fact {
            kind: FactKind::Star,
            status,
            playlist_id,
            created,
        };
        self.enqueue(WriteOperation::Fact(fact.clone())).await?;
        Ok(fact)
    }

    fn signed<R: Resource>(&self, mut resource: R) -> ServerResult<R> {
        resource.set_signature(None);
        let signature = self.signer.sign(&resource)?;
        resource.set_signature(Some(signature));
        Ok(resource)
    }

    async fn enqueue(&self, operation: WriteOperation) -> ServerResult<WriteMessage> {
        let message = WriteMessage::new(&operation)?;
        self.queue
            .send(&message, SendOptions::default())
            .await
            .map_err(|e| match e {
                QueueError::Enqueue(_) => e,
                other => QueueError::Enqueue(other.to_string()),
            })?;
        info!(
            queue = self.queue.name(),
            message_id = %message.id,
            operation = %operation.kind(),
            resource_id = %operation.resource_id(),
            "write enqueued"
        );
        Ok(message)
    }
}

impl std::fmt::Debug for WriteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteService")
            .field("queue", &self.queue.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dp1_crypto::{verify, SIGNATURE_PREFIX};
    use dp1_queue::{BatchSource, MemoryQueue, MessageProcessor};
    use dp1_store::InMemoryKvStore;
    use dp1_types::{License, PlaylistItemInput};
    use std::time::Duration;

    struct Fixture {
        service: WriteService,
        queue: MemoryQueue,
        processor: MessageProcessor,
    }

    impl Fixture {
        fn new() -> Self {
            let store = FeedStore::new(Arc::new(InMemoryKvStore::new()));
            let queue = MemoryQueue::new("writes");
            Self {
                service: WriteService::new(store.clone(), Arc::new(queue.clone()), SigningKey::generate()),
                processor: MessageProcessor::new(store),
                queue,
            }
        }

        async fn drain(&self) {
            let batch = self.queue.receive(100, Duration::from_millis(1)).await.unwrap();
            assert!(self.processor.process_batch(batch).await.success);
        }
    }

    fn item(source: &str) -> PlaylistItemInput {
        PlaylistItemInput {
            title: None,
            source: source.into(),
            duration: 10,
            license: License::Open,
            reference: None,
            display: None,
            provenance: None,
            repro: None,
        }
    }

    fn input() -> PlaylistInput {
        PlaylistInput {
            dp_version: "1.0.0".into(),
            title: "Evening set".into(),
            defaults: None,
            items: vec![item("https://x/y")],
        }
    }

    #[tokio::test]
    async fn create_signs_and_enqueues() {
        let f = Fixture::new();
        let playlist = f.service.create_playlist(input()).await.unwrap();
        let signature = playlist.signature.clone().unwrap();
        assert!(signature.starts_with(SIGNATURE_PREFIX));
        assert!(verify(&playlist, &f.service.verifying_key().as_bytes()));
        assert_eq!(f.queue.pending(), 1);

        // Not persisted until the consumer runs.
        assert!(f.processor.store().get_playlist_by_id(playlist.id).await.unwrap().is_none());
        f.drain().await;
        assert_eq!(
            f.processor.store().get_playlist_by_id(playlist.id).await.unwrap(),
            Some(playlist)
        );
    }

    #[tokio::test]
    async fn invalid_input_is_never_enqueued() {
        let f = Fixture::new();
        let mut bad = input();
        bad.items.clear();
        let err = f.service.create_playlist(bad).await.unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
        assert_eq!(f.queue.pending(), 0);
    }

    #[tokio::test]
    async fn update_preserves_identity_and_resigns() {
        let f = Fixture::new();
        let original = f.service.create_playlist(input()).await.unwrap();
        f.drain().await;

        let update = PlaylistUpdate {
            title: Some("Late set".into()),
            ..PlaylistUpdate::default()
        };
        let updated = f.service.update_playlist(&original.slug, update).await.unwrap();
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.slug, original.slug);
        assert_eq!(updated.created, original.created);
        assert_eq!(updated.title, "Late set");
        assert_ne!(updated.signature, original.signature);
        assert!(verify(&updated, &f.service.verifying_key().as_bytes()));
    }

    #[tokio::test]
    async fn update_of_missing_resource_is_not_found() {
        let f = Fixture::new();
        let update = ChannelUpdate {
            title: Some("x".into()),
            ..ChannelUpdate::default()
        };
        let err = f.service.update_channel("no-such-channel", update).await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let f = Fixture::new();
        let err = f
            .service
            .update_playlist("anything", PlaylistUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[tokio::test]
    async fn enqueue_failure_fails_the_request() {
        let f = Fixture::new();
        f.queue.close();
        let err = f.service.create_playlist(input()).await.unwrap_err();
        assert!(matches!(err, ServerError::Queue(QueueError::Enqueue(_))));
        assert_eq!(err.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn star_fact_carries_creation_time() {
        let f = Fixture::new();
        let playlist = f.service.create_playlist(input()).await.unwrap();
        f.drain().await;
        let fact = f.service.record_star(playlist.id, FactStatus::Active).await.unwrap();
        assert_eq!(fact.created.as_deref(), Some(playlist.created.as_str()));
        f.drain().await;
        assert!(f.processor.store().is_starred(playlist.id).await.unwrap());
    }
}
