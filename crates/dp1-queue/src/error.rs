use dp1_store::StoreError;

/// Errors from the write pipeline.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The transport did not accept a message. Transport-specific causes
    /// are flattened into this variant so callers never depend on them.
    #[error("failed to enqueue message: {0}")]
    Enqueue(String),

    /// A message named an operation the processor does not handle.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// A message's payload did not match its operation.
    #[error("invalid message payload for {operation}: {reason}")]
    InvalidPayload { operation: String, reason: String },

    /// Acknowledgement or receive failed inside the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// A storage write failed while applying a message.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Result alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
