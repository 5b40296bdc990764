//! Crypto plugin error types.

use thiserror::Error;

/// Result type for crypto plugin operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Broad category of a [`CryptoError`], for callers that only care whether
/// they can correct the request themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something the backend will never accept.
    Validation,
    /// The tenant's key material is not in the state the operation needs.
    State,
    /// The backend or hardware behaved in a way that cannot be trusted.
    Integrity,
    /// The backend does not implement the requested operation.
    Unsupported,
    /// Primitive failures (bad ciphertext, encoding, serialization).
    Internal,
}

/// Errors that can occur in crypto plugin operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported algorithm: {algorithm} ({bit_length:?} bits): {detail}")]
    UnsupportedAlgorithm {
        algorithm: String,
        bit_length: Option<u32>,
        /// What the backend would have accepted.
        detail: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("no key-encryption key bound for tenant {0}")]
    KekNotBound(String),

    #[error("HSM initialization failed: {0}")]
    HsmInit(String),

    #[error("found {count} HSM keys labelled {label}, expected at most one")]
    DuplicateKeyLabel { label: String, count: usize },

    #[error("HSM returned {received} random bytes, {requested} requested")]
    EntropyUnderrun { requested: usize, received: usize },

    #[error("mechanism error: {0}")]
    Mechanism(String),

    #[error("HSM operation failed: {0}")]
    Hsm(String),

    #[error("operation not supported: {0}")]
    UnsupportedOperation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CryptoError {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_)
            | Self::UnsupportedAlgorithm { .. }
            | Self::Config(_)
            | Self::InvalidKeyLength { .. } => ErrorKind::Validation,
            Self::KekNotBound(_) => ErrorKind::State,
            Self::HsmInit(_)
            | Self::DuplicateKeyLabel { .. }
            | Self::EntropyUnderrun { .. }
            | Self::Mechanism(_)
            | Self::Hsm(_) => ErrorKind::Integrity,
            Self::UnsupportedOperation(_) => ErrorKind::Unsupported,
            Self::Encryption(_)
            | Self::Decryption(_)
            | Self::KeyGeneration(_)
            | Self::Encoding(_)
            | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}
