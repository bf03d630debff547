use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::QueueResult;
use crate::processor::{BatchResult, MessageProcessor};
use crate::traits::{BatchSource, Delivery};

/// Tuning of the consumer loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Maximum deliveries handed to the processor at once.
    pub batch_size: usize,
    /// How long one receive waits for a first message.
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Pulls batches from a queue and hands them to a [`MessageProcessor`].
pub struct QueueConsumer {
    source: Arc<dyn BatchSource>,
    processor: MessageProcessor,
    config: ConsumerConfig,
}

impl QueueConsumer {
    pub fn new(source: Arc<dyn BatchSource>, processor: MessageProcessor, config: ConsumerConfig) -> Self {
        Self {
            source,
            processor,
            config,
        }
    }

    /// Receive and process at most one batch. Returns `None` when no
    /// message arrived within the poll interval.
    pub async fn poll_once(&self) -> Option<BatchResult> {
        let received = self
            .source
            .receive(self.config.batch_size, self.config.poll_interval)
            .await;
        self.handle(received).await
    }

    async fn handle(&self, received: QueueResult<Vec<Delivery>>) -> Option<BatchResult> {
        let batch = match received {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "receive failed");
                tokio::time::sleep(self.config.poll_interval).await;
                return None;
            }
        };
        if batch.is_empty() {
            return None;
        }
        debug!(size = batch.len(), "batch received");
        Some(self.processor.process_batch(batch).await)
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Only the wait for messages is interrupted by shutdown; a batch that
    /// was received is always processed and settled first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(batch_size = self.config.batch_size, "queue consumer started");
        while !*shutdown.borrow() {
            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = self.source.receive(self.config.batch_size, self.config.poll_interval) => received,
            };
            self.handle(received).await;
        }
        info!("queue consumer stopped");
    }
}

impl std::fmt::Debug for QueueConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConsumer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryQueue;
    use crate::message::{WriteMessage, WriteOperation};
    use crate::traits::{Queue, SendOptions};
    use dp1_store::{FeedStore, InMemoryKvStore};
    use dp1_types::{Playlist, PlaylistInput};

    fn consumer(queue: &MemoryQueue) -> (QueueConsumer, FeedStore) {
        let store = FeedStore::new(Arc::new(InMemoryKvStore::new()));
        let config = ConsumerConfig {
            batch_size: 4,
            poll_interval: Duration::from_millis(5),
        };
        let consumer = QueueConsumer::new(
            Arc::new(queue.clone()),
            MessageProcessor::new(store.clone()),
            config,
        );
        (consumer, store)
    }

    fn playlist(n: i64) -> Playlist {
        Playlist::from_input(
            PlaylistInput {
                dp_version: "1.0.0".into(),
                title: format!("p{n}"),
                defaults: None,
                items: Vec::new(),
            },
            n,
        )
    }

    #[tokio::test]
    async fn poll_once_respects_batch_size() {
        let queue = MemoryQueue::new("writes");
        let (consumer, _) = consumer(&queue);
        for n in 0..6 {
            let msg = WriteMessage::new(&WriteOperation::CreatePlaylist(playlist(n))).unwrap();
            queue.send(&msg, SendOptions::default()).await.unwrap();
        }
        assert_eq!(consumer.poll_once().await.unwrap().processed, 4);
        assert_eq!(consumer.poll_once().await.unwrap().processed, 2);
        assert!(consumer.poll_once().await.is_none());
    }

    #[tokio::test]
    async fn run_drains_queue_and_stops_on_shutdown() {
        let queue = MemoryQueue::new("writes");
        let (consumer, store) = consumer(&queue);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(consumer.run(rx));

        let p = playlist(1);
        let msg = WriteMessage::new(&WriteOperation::CreatePlaylist(p.clone())).unwrap();
        queue.send(&msg, SendOptions::default()).await.unwrap();

        let mut found = None;
        for _ in 0..200 {
            found = store.get_playlist_by_id(p.id).await.unwrap();
            if found.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(found, Some(p));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
