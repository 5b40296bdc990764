//! Parameter and result carriers exchanged between callers and plugins.
//!
//! All types are plain values. The only behaviour here is validation at the
//! call boundary and the value-returning KEK binding helpers.

use crate::error::{CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};

/// Per-tenant key-encryption-key record.
///
/// `plugin_meta` is private to the plugin that bound it. `None` means no
/// key has been created for the tenant yet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KekMetadata {
    pub tenant_id: String,
    pub plugin_name: String,
    pub kek_label: String,
    pub algorithm: Option<String>,
    pub bit_length: Option<u32>,
    pub mode: Option<String>,
    pub plugin_meta: Option<String>,
}

impl KekMetadata {
    /// Creates an unbound record for a tenant.
    pub fn new(
        tenant_id: impl Into<String>,
        plugin_name: impl Into<String>,
        kek_label: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            plugin_name: plugin_name.into(),
            kek_label: kek_label.into(),
            ..Self::default()
        }
    }

    /// Whether a plugin has already created key material for this record.
    pub fn is_bound(&self) -> bool {
        self.plugin_meta.is_some()
    }

    /// Returns a copy carrying the plugin's canonical KEK parameters and
    /// backend-private state.
    pub fn with_binding(
        &self,
        algorithm: &str,
        bit_length: u32,
        mode: &str,
        plugin_meta: String,
    ) -> Self {
        Self {
            algorithm: Some(algorithm.to_string()),
            bit_length: Some(bit_length),
            mode: Some(mode.to_string()),
            plugin_meta: Some(plugin_meta),
            ..self.clone()
        }
    }
}

/// Plaintext handed to `encrypt`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Plaintext {
    Bytes(Vec<u8>),
    Text(String),
}

impl From<Vec<u8>> for Plaintext {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Plaintext {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<String> for Plaintext {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Plaintext {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Request to encrypt a secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptRequest {
    pub unencrypted: Plaintext,
}

impl EncryptRequest {
    pub fn new(unencrypted: impl Into<Plaintext>) -> Self {
        Self {
            unencrypted: unencrypted.into(),
        }
    }

    /// Returns the exact bytes to encrypt.
    ///
    /// Text must be pure ASCII; anything else is rejected rather than
    /// transcoded, so decrypt always returns what the caller meant.
    pub fn plaintext_bytes(&self) -> CryptoResult<&[u8]> {
        match &self.unencrypted {
            Plaintext::Bytes(bytes) => Ok(bytes),
            Plaintext::Text(text) if text.is_ascii() => Ok(text.as_bytes()),
            Plaintext::Text(_) => Err(CryptoError::InvalidInput(
                "text plaintext must be ASCII; pass non-ASCII data as bytes".to_string(),
            )),
        }
    }
}

/// Request to decrypt a previously encrypted secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptRequest {
    pub encrypted: Vec<u8>,
}

impl DecryptRequest {
    pub fn new(encrypted: impl Into<Vec<u8>>) -> Self {
        Self {
            encrypted: encrypted.into(),
        }
    }
}

/// Parameters for symmetric or asymmetric key generation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub algorithm: String,
    pub bit_length: u32,
    pub mode: Option<String>,
    pub passphrase: Option<String>,
}

impl GenerateRequest {
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

    /// Number of whole bytes the requested key occupies.
    ///
    /// Fails for zero or bit lengths that do not fill whole bytes.
    pub fn byte_length(&self) -> CryptoResult<usize> {
        if self.bit_length == 0 || self.bit_length % 8 != 0 {
            return Err(CryptoError::InvalidInput(format!(
                "bit length {} is not a positive multiple of 8",
                self.bit_length
            )));
        }
        Ok((self.bit_length / 8) as usize)
    }
}

/// Result of encryption or key generation.
///
/// `kek_meta_extended` is opaque to callers; store it next to the
/// ciphertext and hand it back unchanged on decrypt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoResponse {
    pub cypher_text: Vec<u8>,
    pub kek_meta_extended: Option<String>,
}

impl CryptoResponse {
    pub fn new(cypher_text: Vec<u8>, kek_meta_extended: Option<String>) -> Self {
        Self {
            cypher_text,
            kek_meta_extended,
        }
    }

    /// Builds the matching decrypt request.
    pub fn to_decrypt_request(&self) -> DecryptRequest {
        DecryptRequest::new(self.cypher_text.clone())
    }
}

/// Wrapped parts of a generated key pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsymmetricResponse {
    pub private_key: CryptoResponse,
    pub public_key: CryptoResponse,
    /// Present only when the request carried a passphrase.
    pub passphrase: Option<CryptoResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_text_passes_validation() {
        let req = EncryptRequest::new("PlainTextSecret");
        assert_eq!(req.plaintext_bytes().unwrap(), b"PlainTextSecret");
    }

    #[test]
    fn non_ascii_text_is_rejected() {
        let req = EncryptRequest::new("unicode_beer\u{1F37A}");
        let err = req.plaintext_bytes().unwrap_err();
        assert!(matches!(err, CryptoError::InvalidInput(_)));
    }

    #[test]
    fn non_ascii_bytes_pass_through() {
        let raw = "unicode_beer\u{1F37A}".as_bytes().to_vec();
        let req = EncryptRequest::new(raw.clone());
        assert_eq!(req.plaintext_bytes().unwrap(), raw.as_slice());
    }

    #[test]
    fn byte_length_requires_whole_bytes() {
        assert_eq!(GenerateRequest::new("aes", 256).byte_length().unwrap(), 32);
        assert!(GenerateRequest::new("aes", 12).byte_length().is_err());
        assert!(GenerateRequest::new("aes", 0).byte_length().is_err());
    }

    #[test]
    fn with_binding_leaves_original_untouched() {
        let unbound = KekMetadata::new("tenant-1", "simple_crypto", "label-1");
        let bound = unbound.with_binding("aes", 128, "cbc", "wrapped".into());

        assert!(!unbound.is_bound());
        assert!(bound.is_bound());
        assert_eq!(bound.tenant_id, "tenant-1");
        assert_eq!(bound.algorithm.as_deref(), Some("aes"));
        assert_eq!(bound.bit_length, Some(128));
        assert_eq!(bound.mode.as_deref(), Some("cbc"));
    }
}
