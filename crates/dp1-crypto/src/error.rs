/// Environment variable holding the operator's signing key.
pub const PRIVATE_KEY_VAR: &str = "ED25519_PRIVATE_KEY";

/// Errors from canonical serialization.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CanonicalizationError {
    /// Nesting went deeper than the walker allows. Owned JSON trees cannot
    /// contain reference cycles, so runaway nesting is how a self-referencing
    /// structure shows up here.
    #[error("nesting exceeds {limit} levels (circular structure?)")]
    DepthExceeded { limit: usize },

    /// The value has no JSON representation.
    #[error("value is not JSON-serializable: {0}")]
    NotSerializable(String),
}

/// Errors from key loading and signing.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("{variable} is not configured; set it to a hex-encoded Ed25519 private key")]
    KeyConfiguration { variable: String },

    #[error("invalid private key format: {0}")]
    KeyFormat(String),

    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
