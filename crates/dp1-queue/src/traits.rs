use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::message::WriteMessage;

/// Per-send options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Hold the message back for this long before it becomes deliverable.
    pub delay: Option<Duration>,
}

impl SendOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

/// Producer side of a message queue.
///
/// Implementations map every transport-specific failure to
/// [`QueueError::Enqueue`](crate::QueueError::Enqueue).
#[async_trait]
pub trait Queue: Send + Sync {
    async fn send(&self, message: &WriteMessage, options: SendOptions) -> QueueResult<()>;

    /// Stable name of the queue, used in logs.
    fn name(&self) -> &str;
}

/// Settles deliveries on behalf of a transport.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// The delivery was handled; drop it.
    async fn ack(&self, delivery_id: &str) -> QueueResult<()>;

    /// The delivery failed; make it available again.
    async fn retry(&self, delivery_id: &str) -> QueueResult<()>;
}

/// Consumer side of a pull-based queue.
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// Receive up to `max` deliveries, waiting at most `wait` for the first.
    /// An empty batch means nothing arrived in time.
    async fn receive(&self, max: usize, wait: Duration) -> QueueResult<Vec<Delivery>>;
}

/// One delivery of a message. The same message may be delivered more than
/// once; `attempts` counts deliveries including this one.
pub struct Delivery {
    pub id: String,
    pub timestamp: String,
    pub body: WriteMessage,
    pub attempts: u32,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        id: impl Into<String>,
        body: WriteMessage,
        attempts: u32,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: body.timestamp.clone(),
            body,
            attempts,
            acker,
        }
    }

    pub async fn ack(&self) -> QueueResult<()> {
        self.acker.ack(&self.id).await
    }

    pub async fn retry(&self) -> QueueResult<()> {
        self.acker.retry(&self.id).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.id)
            .field("message_id", &self.body.id)
            .field("attempts", &self.attempts)
            .finish()
    }
}
