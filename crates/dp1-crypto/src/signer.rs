use ed25519_dalek::pkcs8::DecodePrivateKey;
use serde::Serialize;
use serde_json::Value;

use crate::canonical::{canonicalize_unsigned, canonicalize_value};
use crate::error::{CryptoError, CryptoResult, PRIVATE_KEY_VAR};

/// Prefix of every signature string produced by the feed.
pub const SIGNATURE_PREFIX: &str = "ed25519:0x";

/// Number of hex characters following [`SIGNATURE_PREFIX`].
const SIGNATURE_HEX_LEN: usize = 128;

/// Ed25519 signing key (private).
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 verifying key (public).
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from a raw 32-byte seed.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// Load the key named by `ED25519_PRIVATE_KEY` from the environment.
    pub fn from_env() -> CryptoResult<Self> {
        Self::from_config(std::env::var(PRIVATE_KEY_VAR).ok().as_deref())
    }

    /// Load a key from an optional configured secret.
    ///
    /// A missing or blank secret is a configuration error; anything else is
    /// parsed with [`Self::from_hex`].
    pub fn from_config(secret: Option<&str>) -> CryptoResult<Self> {
        match secret.map(str::trim) {
            Some(s) if !s.is_empty() => Self::from_hex(s),
            _ => Err(CryptoError::KeyConfiguration {
                variable: PRIVATE_KEY_VAR.to_string(),
            }),
        }
    }

    /// Parse a hex secret, optionally `0x`-prefixed.
    ///
    /// Accepted encodings:
    /// - 32 bytes: raw seed
    /// - 64 bytes: seed followed by its public key
    /// - anything else: PKCS#8 DER (v1 or v2)
    pub fn from_hex(secret: &str) -> CryptoResult<Self> {
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            return Err(CryptoError::KeyConfiguration {
                variable: PRIVATE_KEY_VAR.to_string(),
            });
        }
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.len() % 2 != 0 {
            return Err(CryptoError::KeyFormat(format!(
                "hex string has odd length {}",
                digits.len()
            )));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| CryptoError::KeyFormat(format!("not valid hex: {e}")))?;

        match bytes.len() {
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes);
                Ok(Self::from_bytes(seed))
            }
            64 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes[..32]);
                let key = Self::from_bytes(seed);
                if key.verifying_key().as_bytes()[..] != bytes[32..] {
                    return Err(CryptoError::KeyFormat(
                        "64-byte key: public half does not match seed".into(),
                    ));
                }
                Ok(key)
            }
            len => ed25519_dalek::SigningKey::from_pkcs8_der(&bytes)
                .map(Self)
                .map_err(|e| {
                    CryptoError::KeyFormat(format!(
                        "{len} bytes is neither a raw seed nor a PKCS#8 key: {e}"
                    ))
                }),
        }
    }

    /// The corresponding public verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// Raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Sign raw bytes and return the `ed25519:0x...` string form.
    pub fn sign_bytes(&self, message: &[u8]) -> String {
        use ed25519_dalek::Signer;
        format_signature(&self.0.sign(message).to_bytes())
    }

    /// Sign the canonical form of `resource` (its `signature` field, if any,
    /// is excluded).
    pub fn sign<T: Serialize + ?Sized>(&self, resource: &T) -> CryptoResult<String> {
        let canonical = canonicalize_unsigned(resource)?;
        Ok(self.sign_bytes(canonical.as_bytes()))
    }
}

impl VerifyingKey {
    /// Create from raw public key bytes. Returns `None` for anything that is
    /// not a 32-byte point encoding.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        ed25519_dalek::VerifyingKey::from_bytes(&arr).ok().map(Self)
    }

    /// Parse a hex public key, optionally `0x`-prefixed.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        Self::from_slice(&hex::decode(digits).ok()?)
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Verify a signed resource against this key.
    pub fn verify<T: Serialize + ?Sized>(&self, resource: &T) -> bool {
        verify(resource, &self.as_bytes())
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", self.to_hex())
    }
}

/// Render a 64-byte signature as `ed25519:0x` + 128 lowercase hex chars.
pub fn format_signature(bytes: &[u8; 64]) -> String {
    format!("{SIGNATURE_PREFIX}{}", hex::encode(bytes))
}

/// Parse a signature string. Only the exact lowercase form is accepted.
pub fn parse_signature(s: &str) -> Option<[u8; 64]> {
    let digits = s.strip_prefix(SIGNATURE_PREFIX)?;
    if digits.len() != SIGNATURE_HEX_LEN
        || !digits.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        return None;
    }
    let mut out = [0u8; 64];
    hex::decode_to_slice(digits, &mut out).ok()?;
    Some(out)
}

/// Sign `resource` with `key`. See [`SigningKey::sign`].
pub fn sign<T: Serialize + ?Sized>(resource: &T, key: &SigningKey) -> CryptoResult<String> {
    key.sign(resource)
}

/// Verify a fully populated resource against a raw public key.
///
/// Every failure, whether a missing or malformed signature, a bad key, or a
/// tampered payload, yields `false`.
pub fn verify<T: Serialize + ?Sized>(resource: &T, public_key: &[u8]) -> bool {
    match serde_json::to_value(resource) {
        Ok(value) => verify_value(&value, public_key),
        Err(_) => false,
    }
}

/// [`verify`] over an untyped JSON document.
pub fn verify_value(resource: &Value, public_key: &[u8]) -> bool {
    let Some(fields) = resource.as_object() else {
        return false;
    };
    let Some(signature) = fields
        .get("signature")
        .and_then(Value::as_str)
        .and_then(parse_signature)
    else {
        return false;
    };
    let Some(key) = VerifyingKey::from_slice(public_key) else {
        return false;
    };

    let mut unsigned = fields.clone();
    unsigned.remove("signature");
    let Ok(canonical) = canonicalize_value(&Value::Object(unsigned)) else {
        return false;
    };

    let signature = ed25519_dalek::Signature::from_bytes(&signature);
    key.0.verify_strict(canonical.as_bytes(), &signature).is_ok()
}
