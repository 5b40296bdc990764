//! Crypto plugin configuration.
//!
//! Only the shape and defaults live here. Where the values come from (files,
//! environment, a secrets manager) is the host application's business;
//! [`CryptoConfig::from_toml_str`] is provided for hosts that keep it in TOML.

use crate::error::{CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};

/// Well-known development master key. Never use it outside local testing.
pub const DEV_MASTER_KEK: &str = "dGhpcnR5X3R3b19ieXRlX2tleWJsYWhibGFoYmxhaGg=";

/// Configuration for the software backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleCryptoConfig {
    /// Master KEK, 32 bytes, url-safe base64.
    pub kek: String,

    /// Largest RSA modulus `generate_asymmetric` will accept.
    pub max_rsa_bit_length: u32,
}

impl Default for SimpleCryptoConfig {
    fn default() -> Self {
        Self {
            kek: DEV_MASTER_KEK.to_string(),
            max_rsa_bit_length: 4096,
        }
    }
}

impl SimpleCryptoConfig {
    /// Whether the master key is still the published development key.
    pub fn uses_dev_kek(&self) -> bool {
        self.kek == DEV_MASTER_KEK
    }
}

/// Configuration for the PKCS#11 backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct P11CryptoConfig {
    /// Path to the vendor PKCS#11 library. Required.
    pub library_path: Option<String>,

    /// User PIN for the token.
    pub login: Option<String>,

    /// Slot holding the token.
    pub slot_id: u64,

    /// GCM authentication tag length in bits.
    pub gcm_tag_bits: u64,

    /// Length of generated tenant KEKs in bytes.
    pub kek_length_bytes: usize,
}

impl Default for P11CryptoConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            login: None,
            slot_id: 1,
            gcm_tag_bits: 128,
            kek_length_bytes: 32,
        }
    }
}

/// Top-level crypto configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Plugin names in selection order.
    pub enabled_plugins: Vec<String>,

    pub simple_crypto: Option<SimpleCryptoConfig>,

    pub p11_crypto: Option<P11CryptoConfig>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            enabled_plugins: vec![crate::simple::PLUGIN_NAME.to_string()],
            simple_crypto: Some(SimpleCryptoConfig::default()),
            p11_crypto: None,
        }
    }
}

impl CryptoConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> CryptoResult<Self> {
        toml::from_str(s).map_err(|e| CryptoError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_simple_crypto_only() {
        let config = CryptoConfig::default();
        assert_eq!(config.enabled_plugins, vec!["simple_crypto".to_string()]);
        assert!(config.simple_crypto.unwrap().uses_dev_kek());
        assert!(config.p11_crypto.is_none());
    }

    #[test]
    fn parses_toml_with_partial_sections() {
        let config = CryptoConfig::from_toml_str(
            r#"
            enabled_plugins = ["p11_crypto", "simple_crypto"]

            [simple_crypto]
            max_rsa_bit_length = 2048

            [p11_crypto]
            library_path = "/usr/lib/libCryptoki2_64.so"
            login = "hunter2"
            "#,
        )
        .unwrap();

        assert_eq!(config.enabled_plugins.len(), 2);
        let simple = config.simple_crypto.unwrap();
        assert_eq!(simple.max_rsa_bit_length, 2048);
        assert_eq!(simple.kek, DEV_MASTER_KEK);

        let p11 = config.p11_crypto.unwrap();
        assert_eq!(p11.library_path.as_deref(), Some("/usr/lib/libCryptoki2_64.so"));
        assert_eq!(p11.slot_id, 1);
        assert_eq!(p11.gcm_tag_bits, 128);
        assert_eq!(p11.kek_length_bytes, 32);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = CryptoConfig::from_toml_str("enabled_plugins = 7").unwrap_err();
        assert!(matches!(err, CryptoError::Config(_)));
    }
}
