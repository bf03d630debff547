use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::message::WriteMessage;
use crate::traits::{Acknowledger, BatchSource, Delivery, Queue, SendOptions};

/// Deliveries of one message before it is moved to the dead-letter list.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Clone, Debug)]
struct Entry {
    message: WriteMessage,
    attempts: u32,
}

#[derive(Default)]
struct Inner {
    ready: VecDeque<Entry>,
    in_flight: HashMap<String, Entry>,
    dead: Vec<WriteMessage>,
}

struct Shared {
    inner: Mutex<Inner>,
    notify: Notify,
    closed: AtomicBool,
    next_delivery: AtomicU64,
    max_attempts: u32,
}

impl Shared {
    fn lock(&self) -> QueueResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| QueueError::Transport(e.to_string()))
    }

    fn push(&self, entry: Entry) -> QueueResult<()> {
        self.lock()?.ready.push_back(entry);
        self.notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for Shared {
    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        self.lock()?.in_flight.remove(delivery_id);
        Ok(())
    }

    async fn retry(&self, delivery_id: &str) -> QueueResult<()> {
        let mut inner = self.lock()?;
        let Some(entry) = inner.in_flight.remove(delivery_id) else {
            return Ok(());
        };
        if entry.attempts >= self.max_attempts {
            warn!(
                message_id = %entry.message.id,
                attempts = entry.attempts,
                "message exhausted its attempts, moved to dead letters"
            );
            inner.dead.push(entry.message);
        } else {
            inner.ready.push_back(entry);
            drop(inner);
            self.notify.notify_one();
        }
        Ok(())
    }
}

/// In-process queue with at-least-once delivery.
///
/// Messages wait in a FIFO until received. A received message stays in
/// flight until it is acked (dropped) or retried (requeued at the back).
/// After `max_attempts` deliveries a retried message goes to the
/// dead-letter list instead.
#[derive(Clone)]
pub struct MemoryQueue {
    name: String,
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_max_attempts(name, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(name: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                next_delivery: AtomicU64::new(1),
                max_attempts: max_attempts.max(1),
            }),
        }
    }

    /// Stop accepting new messages. Already queued messages stay receivable.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Messages waiting to be received.
    pub fn pending(&self) -> usize {
        self.shared.lock().map(|i| i.ready.len()).unwrap_or(0)
    }

    /// Messages received but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().map(|i| i.in_flight.len()).unwrap_or(0)
    }

    /// Messages that exhausted their attempts.
    pub fn dead_letters(&self) -> Vec<WriteMessage> {
        self.shared.lock().map(|i| i.dead.clone()).unwrap_or_default()
    }

    fn take_ready(&self, max: usize) -> QueueResult<Vec<Delivery>> {
        let mut inner = self.shared.lock()?;
        let n = max.min(inner.ready.len());
        let drained: Vec<Entry> = inner.ready.drain(..n).collect();
        let mut batch = Vec::with_capacity(n);
        for mut entry in drained {
            entry.attempts += 1;
            let id = format!(
                "{}-{}",
                self.name,
                self.shared.next_delivery.fetch_add(1, Ordering::Relaxed)
            );
            let acker: Arc<dyn Acknowledger> = self.shared.clone();
            batch.push(Delivery::new(
                id.clone(),
                entry.message.clone(),
                entry.attempts,
                acker,
            ));
            inner.in_flight.insert(id, entry);
        }
        Ok(batch)
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn send(&self, message: &WriteMessage, options: SendOptions) -> QueueResult<()> {
        if self.is_closed() {
            return Err(QueueError::Enqueue(format!("queue {} is closed", self.name)));
        }
        let entry = Entry {
            message: message.clone(),
            attempts: 0,
        };
        match options.delay {
            Some(delay) if !delay.is_zero() => {
                let shared = self.shared.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = shared.push(entry) {
                        warn!(error = %e, "delayed message dropped");
                    }
                });
            }
            _ => self
                .shared
                .push(entry)
                .map_err(|e| QueueError::Enqueue(e.to_string()))?,
        }
        debug!(queue = %self.name, message_id = %message.id, "message enqueued");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl BatchSource for MemoryQueue {
    async fn receive(&self, max: usize, wait: Duration) -> QueueResult<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let batch = self.take_ready(max)?;
        if !batch.is_empty() {
            return Ok(batch);
        }
        // Notify stores a permit, so a send between take_ready and here is not lost.
        let _ = tokio::time::timeout(wait, self.shared.notify.notified()).await;
        self.take_ready(max)
    }
}

impl std::fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryQueue")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str) -> WriteMessage {
        WriteMessage {
            id: id.into(),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            operation: "fact".into(),
            data: serde_json::json!({}),
        }
    }

    const NO_WAIT: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn receive_is_fifo_and_bounded() {
        let q = MemoryQueue::new("q");
        for i in 0..5 {
            q.send(&msg(&i.to_string()), SendOptions::default()).await.unwrap();
        }
        let batch = q.receive(3, NO_WAIT).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|d| d.body.id.as_str()).collect();
        assert_eq!(ids, ["0", "1", "2"]);
        assert_eq!(q.pending(), 2);
        assert_eq!(q.in_flight(), 3);
    }

    #[tokio::test]
    async fn ack_settles_and_retry_redelivers() {
        let q = MemoryQueue::new("q");
        q.send(&msg("a"), SendOptions::default()).await.unwrap();
        q.send(&msg("b"), SendOptions::default()).await.unwrap();
        let batch = q.receive(10, NO_WAIT).await.unwrap();
        batch[0].ack().await.unwrap();
        batch[1].retry().await.unwrap();
        assert_eq!(q.in_flight(), 0);

        let again = q.receive(10, NO_WAIT).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].body.id, "b");
        assert_eq!(again[0].attempts, 2);
    }

    #[tokio::test]
    async fn exhausted_messages_go_to_dead_letters() {
        let q = MemoryQueue::with_max_attempts("q", 2);
        q.send(&msg("x"), SendOptions::default()).await.unwrap();
        for _ in 0..2 {
            let batch = q.receive(1, NO_WAIT).await.unwrap();
            batch[0].retry().await.unwrap();
        }
        assert!(q.receive(1, NO_WAIT).await.unwrap().is_empty());
        assert_eq!(q.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn closed_queue_rejects_sends() {
        let q = MemoryQueue::new("q");
        q.close();
        let err = q.send(&msg("a"), SendOptions::default()).await.unwrap_err();
        assert!(matches!(err, QueueError::Enqueue(_)));
    }

    #[tokio::test]
    async fn receive_waits_for_a_send() {
        let q = MemoryQueue::new("q");
        let producer = q.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.send(&msg("late"), SendOptions::default()).await.unwrap();
        });
        let batch = q.receive(1, Duration::from_secs(2)).await.unwrap();
        assert_eq!(batch[0].body.id, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_send_is_held_back() {
        let q = MemoryQueue::new("q");
        q.send(&msg("d"), SendOptions::delayed(Duration::from_secs(5)))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(q.pending(), 0);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(q.pending(), 1);
    }
}
