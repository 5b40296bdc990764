//! Records the orchestrator persists and the specs it accepts.

use crate::error::{ResourceError, ResourceResult};
use chrono::{DateTime, Utc};
use cipherkeep_crypto::GenerateRequest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What to generate: algorithm, size, and optional mode and passphrase.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSpec {
    pub algorithm: String,
    pub bit_length: u32,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl SecretSpec {
    pub fn new(algorithm: impl Into<String>, bit_length: u32) -> Self {
        Self {
            algorithm: algorithm.into(),
            bit_length,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Rejects specs no backend could ever satisfy.
    pub fn validate(&self) -> ResourceResult<()> {
        if self.algorithm.trim().is_empty() {
            return Err(ResourceError::InvalidSpec("algorithm is required".to_string()));
        }
        if self.bit_length == 0 {
            return Err(ResourceError::InvalidSpec(
                "bit_length must be positive".to_string(),
            ));
        }
        if self.passphrase.as_deref() == Some("") {
            return Err(ResourceError::InvalidSpec(
                "passphrase must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_generate_request(&self) -> GenerateRequest {
        GenerateRequest {
            algorithm: self.algorithm.clone(),
            bit_length: self.bit_length,
            mode: self.mode.clone(),
            passphrase: self.passphrase.clone(),
        }
    }
}

/// Ciphertext plus everything needed to decrypt it again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDatum {
    pub cypher_text: Vec<u8>,
    pub kek_meta_extended: Option<String>,
    pub plugin_name: String,
    pub kek_label: String,
}

/// A stored, encrypted secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub algorithm: Option<String>,
    pub bit_length: Option<u32>,
    pub mode: Option<String>,
    pub content_type: String,
    pub datum: EncryptedDatum,
    pub created_at: DateTime<Utc>,
}

/// Role of a secret inside an asymmetric container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretRole {
    PublicKey,
    PrivateKey,
    PrivateKeyPassphrase,
}

impl SecretRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicKey => "public_key",
            Self::PrivateKey => "private_key",
            Self::PrivateKeyPassphrase => "private_key_passphrase",
        }
    }
}

/// Named reference from a container to one of its secrets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSecretRef {
    pub name: String,
    pub secret_id: Uuid,
}

/// Groups the secrets of a generated key pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretContainer {
    pub id: Uuid,
    pub tenant_id: String,
    /// Lowercase algorithm name, e.g. `rsa`.
    pub container_type: String,
    pub secret_refs: Vec<ContainerSecretRef>,
    pub created_at: DateTime<Utc>,
}

impl SecretContainer {
    /// Id of the secret stored under `role`, if the container has one.
    pub fn secret_id(&self, role: SecretRole) -> Option<Uuid> {
        self.secret_refs
            .iter()
            .find(|r| r.name == role.as_str())
            .map(|r| r.secret_id)
    }
}

/// Plaintext returned by `get_secret`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedSecret {
    pub content_type: String,
    pub payload: Vec<u8>,
}
