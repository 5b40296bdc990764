//! Orchestration and storage error types.

use cipherkeep_crypto::{CryptoError, PluginSupportType};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Result type for storage collaborator calls.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for orchestration operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Errors reported by a [`crate::SecretRepository`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Write step of asymmetric generation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistStage {
    PublicKey,
    Passphrase,
    Container,
}

impl fmt::Display for PersistStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PublicKey => "public key",
            Self::Passphrase => "passphrase",
            Self::Container => "container",
        })
    }
}

/// Errors that can occur while orchestrating secret operations.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("no plugin supports {capability} for {algorithm:?} ({bit_length:?} bits)")]
    NoCapablePlugin {
        capability: PluginSupportType,
        algorithm: Option<String>,
        bit_length: Option<u32>,
    },

    #[error("invalid secret spec: {0}")]
    InvalidSpec(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A write failed after earlier writes succeeded. `written` lists the
    /// secrets already persisted; nothing is rolled back or retried.
    #[error("{stage} write failed after {} secrets were stored: {source}", .written.len())]
    PartialFailure {
        stage: PersistStage,
        written: Vec<Uuid>,
        #[source]
        source: StorageError,
    },

    #[error("not found: {0}")]
    NotFound(String),
}
