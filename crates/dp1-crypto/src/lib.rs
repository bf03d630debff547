//! Canonicalization and signing for DP-1 feed resources.
//!
//! Every persisted playlist and channel carries an Ed25519 signature over
//! its canonical form: key-sorted JSON with a single trailing line feed,
//! computed over all fields except `signature`.
//!
//! Signing wraps `ed25519-dalek`; no custom cryptography.

pub mod canonical;
pub mod error;
pub mod signer;

pub use canonical::{canonicalize, canonicalize_unsigned, canonicalize_value, MAX_DEPTH};
pub use error::{CanonicalizationError, CryptoError, CryptoResult, PRIVATE_KEY_VAR};
pub use signer::{
    format_signature, parse_signature, sign, verify, verify_value, SigningKey, VerifyingKey,
    SIGNATURE_PREFIX,
};
