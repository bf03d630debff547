use std::panic::AssertUnwindSafe;

use dp1_store::FeedStore;
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::message::{FactStatus, WriteMessage, WriteOperation};
use crate::traits::Delivery;

/// A message that could not be applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingFailure {
    pub message_id: String,
    pub error: String,
}

/// Outcome of one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// `true` iff no message failed.
    pub success: bool,
    /// Messages applied successfully.
    pub processed: usize,
    pub errors: Vec<ProcessingFailure>,
}

impl BatchResult {
    fn from_outcomes(outcomes: Vec<(String, QueueResult<()>)>) -> Self {
        let mut result = Self::default();
        for (message_id, outcome) in outcomes {
            match outcome {
                Ok(()) => result.processed += 1,
                Err(e) => result.errors.push(ProcessingFailure {
                    message_id,
                    error: e.to_string(),
                }),
            }
        }
        result.success = result.errors.is_empty();
        result
    }
}

/// Applies queued writes to the feed store.
///
/// Every write is an idempotent overwrite keyed by resource id, so a
/// message delivered twice leaves the store as if it were delivered once.
#[derive(Clone)]
pub struct MessageProcessor {
    store: FeedStore,
}

impl MessageProcessor {
    pub fn new(store: FeedStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    /// Decode and apply one message.
    pub async fn apply(&self, message: &WriteMessage) -> QueueResult<()> {
        let operation = message.decode()?;
        let resource_id = operation.resource_id();
        match &operation {
            WriteOperation::CreatePlaylist(p) | WriteOperation::UpdatePlaylist(p) => {
                self.store.put_playlist(p).await?
            }
            WriteOperation::CreateChannel(c) | WriteOperation::UpdateChannel(c) => {
                self.store.put_channel(c).await?
            }
            WriteOperation::Fact(fact) => match fact.status {
                FactStatus::Active => {
                    self.store
                        .star_playlist(fact.playlist_id, fact.created.as_deref())
                        .await?
                }
                FactStatus::Revoked => {
                    self.store
                        .unstar_playlist(fact.playlist_id, fact.created.as_deref())
                        .await?
                }
            },
        }
        debug!(
            message_id = %message.id,
            operation = %operation.kind(),
            %resource_id,
            "write applied"
        );
        Ok(())
    }

    /// Apply one message, turning a panic into an ordinary failure.
    async fn apply_isolated(&self, message: &WriteMessage) -> QueueResult<()> {
        match AssertUnwindSafe(self.apply(message)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                Err(QueueError::Panicked(reason))
            }
        }
    }

    /// Apply a batch of messages concurrently.
    ///
    /// A failing message never prevents its siblings from being applied;
    /// every failure is reported with the id of its message.
    pub async fn process_messages(&self, messages: &[WriteMessage]) -> BatchResult {
        let outcomes = join_all(messages.iter().map(|m| async move {
            let outcome = self.apply_isolated(m).await;
            if let Err(e) = &outcome {
                warn!(message_id = %m.id, operation = %m.operation, error = %e, "write failed");
            }
            (m.id.clone(), outcome)
        }))
        .await;
        let result = BatchResult::from_outcomes(outcomes);
        info!(
            processed = result.processed,
            failed = result.errors.len(),
            "batch processed"
        );
        result
    }

    /// Apply a batch of deliveries, acking successes and retrying failures.
    pub async fn process_batch(&self, deliveries: Vec<Delivery>) -> BatchResult {
        let outcomes = join_all(deliveries.iter().map(|d| async move {
            let outcome = self.apply_isolated(&d.body).await;
            let settled = match &outcome {
                Ok(()) => d.ack().await,
                Err(e) => {
                    warn!(
                        message_id = %d.body.id,
                        operation = %d.body.operation,
                        attempts = d.attempts,
                        error = %e,
                        "write failed, scheduling retry"
                    );
                    d.retry().await
                }
            };
            if let Err(e) = settled {
                warn!(message_id = %d.body.id, error = %e, "failed to settle delivery");
            }
            (d.body.id.clone(), outcome)
        }))
        .await;
        let result = BatchResult::from_outcomes(outcomes);
        info!(
            processed = result.processed,
            failed = result.errors.len(),
            "batch processed"
        );
        result
    }
}

impl std::fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProcessor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryQueue;
    use crate::message::{Fact, FactKind};
    use crate::traits::{BatchSource, Queue, SendOptions};
    use async_trait::async_trait;
    use dp1_store::{InMemoryKvStore, KvStore, ListOptions, ListQuery, ListResult, StoreError, StoreResult};
    use dp1_types::{Channel, ChannelInput, License, Playlist, PlaylistInput, PlaylistItemInput};
    use std::sync::Arc;
    use std::time::Duration;

    /// Delegates to an in-memory store but fails any write touching `poison`.
    struct PoisonedKv {
        inner: InMemoryKvStore,
        poison: String,
    }

    #[async_trait]
    impl KvStore for PoisonedKv {
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.inner.get(key).await
        }
        async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
            if key.contains(&self.poison) {
                return Err(StoreError::Backend(format!("write refused: {key}")));
            }
            self.inner.put(key, value).await
        }
        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.inner.delete(key).await
        }
        async fn list(&self, options: ListOptions) -> StoreResult<ListResult> {
            self.inner.list(options).await
        }
    }

    fn playlist(title: &str, created_ms: i64) -> Playlist {
        Playlist::from_input(
            PlaylistInput {
                dp_version: "1.0.0".into(),
                title: title.into(),
                defaults: None,
                items: vec![PlaylistItemInput {
                    title: Some("one".into()),
                    source: "https://cdn.example/a.html".into(),
                    duration: 30,
                    license: License::Open,
                    reference: None,
                    display: None,
                    provenance: None,
                    repro: None,
                }],
            },
            created_ms,
        )
    }

    fn create(p: &Playlist) -> WriteMessage {
        WriteMessage::new(&WriteOperation::CreatePlaylist(p.clone())).unwrap()
    }

    fn processor() -> (MessageProcessor, Arc<InMemoryKvStore>) {
        let kv = Arc::new(InMemoryKvStore::new());
        (MessageProcessor::new(FeedStore::new(kv.clone())), kv)
    }

    #[tokio::test]
    async fn applies_each_operation_kind() {
        let (proc, _) = processor();
        let p = playlist("A", 1_000);
        let channel = Channel::from_input(
            ChannelInput {
                title: "Chan".into(),
                curator: None,
                summary: None,
                playlists: vec![format!("https://feed.example/api/v1/playlists/{}", p.id)],
            },
            2_000,
        );
        let star = Fact {
            kind: FactKind::Star,
            status: FactStatus::Active,
            playlist_id: p.id,
            created: None,
        };
        let messages = vec![
            create(&p),
            WriteMessage::new(&WriteOperation::CreateChannel(channel.clone())).unwrap(),
        ];
        let result = proc.process_messages(&messages).await;
        assert!(result.success);
        assert_eq!(result.processed, 2);

        let result = proc
            .process_messages(&[WriteMessage::new(&WriteOperation::Fact(star)).unwrap()])
            .await;
        assert!(result.success);

        let store = proc.store();
        assert_eq!(store.get_playlist(&p.slug).await.unwrap(), Some(p.clone()));
        assert_eq!(store.get_channel(&channel.id.to_string()).await.unwrap(), Some(channel));
        assert!(store.is_starred(p.id).await.unwrap());
    }

    #[tokio::test]
    async fn revoked_fact_removes_the_star() {
        let (proc, _) = processor();
        let p = playlist("A", 1_000);
        let fact = |status| {
            WriteMessage::new(&WriteOperation::Fact(Fact {
                kind: FactKind::Star,
                status,
                playlist_id: p.id,
                created: Some(p.created.clone()),
            }))
            .unwrap()
        };
        proc.process_messages(&[create(&p)]).await;
        proc.process_messages(&[fact(FactStatus::Active)]).await;
        let result = proc.process_messages(&[fact(FactStatus::Revoked)]).await;
        assert!(result.success);
        assert!(!proc.store().is_starred(p.id).await.unwrap());
        let starred = proc.store().list_starred(&ListQuery::default()).await.unwrap();
        assert!(starred.items.is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_block_siblings() {
        let bad = playlist("bad", 2_000);
        let kv = Arc::new(PoisonedKv {
            inner: InMemoryKvStore::new(),
            poison: bad.id.to_string(),
        });
        let proc = MessageProcessor::new(FeedStore::new(kv));
        let good: Vec<Playlist> = (0..4).map(|i| playlist(&format!("g{i}"), 1_000 + i)).collect();

        let mut messages: Vec<WriteMessage> = good.iter().map(create).collect();
        messages.insert(2, create(&bad));
        let result = proc.process_messages(&messages).await;

        assert!(!result.success);
        assert_eq!(result.processed, 4);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message_id, messages[2].id);
        for p in &good {
            assert!(proc.store().get_playlist_by_id(p.id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn unknown_operation_fails_only_its_message() {
        let (proc, _) = processor();
        let p = playlist("A", 1_000);
        let rogue = WriteMessage {
            id: "rogue-1".into(),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            operation: "purge".into(),
            data: serde_json::json!({}),
        };
        let result = proc.process_messages(&[rogue, create(&p)]).await;
        assert_eq!(result.processed, 1);
        assert_eq!(result.errors[0].message_id, "rogue-1");
        assert!(result.errors[0].error.contains("purge"));
    }

    #[tokio::test]
    async fn redelivery_leaves_store_unchanged() {
        let (proc, kv) = processor();
        let p = playlist("A", 1_000);
        let msg = create(&p);
        proc.process_messages(std::slice::from_ref(&msg)).await;
        let once = kv.snapshot();
        proc.process_messages(&[msg.clone(), msg]).await;
        assert_eq!(kv.snapshot(), once);
    }

    #[tokio::test]
    async fn deliveries_are_acked_or_retried() {
        let bad = playlist("bad", 2_000);
        let kv = Arc::new(PoisonedKv {
            inner: InMemoryKvStore::new(),
            poison: bad.id.to_string(),
        });
        let proc = MessageProcessor::new(FeedStore::new(kv));
        let queue = MemoryQueue::with_max_attempts("writes", 3);
        let good = playlist("good", 1_000);
        queue.send(&create(&good), SendOptions::default()).await.unwrap();
        queue.send(&create(&bad), SendOptions::default()).await.unwrap();

        let batch = queue.receive(10, Duration::from_millis(1)).await.unwrap();
        let result = proc.process_batch(batch).await;
        assert_eq!(result.processed, 1);
        assert_eq!(queue.in_flight(), 0);
        assert_eq!(queue.pending(), 1);

        for _ in 0..2 {
            let batch = queue.receive(10, Duration::from_millis(1)).await.unwrap();
            proc.process_batch(batch).await;
        }
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.dead_letters().len(), 1);
        assert_eq!(queue.dead_letters()[0].data["playlistId"], bad.id.to_string());
    }
}
