//! Asynchronous write pipeline of the DP-1 feed.
//!
//! API writes are not applied inline. The request path wraps each write in
//! a [`WriteMessage`] and hands it to a [`Queue`]; a [`QueueConsumer`] pulls
//! batches and a [`MessageProcessor`] applies them to the feed store.
//!
//! Delivery is at-least-once. Every write is an idempotent overwrite, so a
//! redelivered message is harmless, and a failure in one message of a batch
//! never prevents the others from being applied.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod message;
pub mod processor;
pub mod traits;

pub use consumer::{ConsumerConfig, QueueConsumer};
pub use error::{QueueError, QueueResult};
pub use memory::{MemoryQueue, DEFAULT_MAX_ATTEMPTS};
pub use message::{
    message_id, Fact, FactKind, FactStatus, OperationKind, WriteMessage, WriteOperation,
};
pub use processor::{BatchResult, MessageProcessor, ProcessingFailure};
pub use traits::{Acknowledger, BatchSource, Delivery, Queue, SendOptions};
