//! Software backend: two-tier envelope encryption.
//!
//! A process-wide master KEK wraps one random key per tenant. The wrapped
//! tenant key lives in [`KekMetadata::plugin_meta`] as token text, and the
//! tenant key in turn encrypts that tenant's secrets. Nothing but the master
//! key is held in memory between calls.

use crate::config::SimpleCryptoConfig;
use crate::dto::{
    AsymmetricResponse, CryptoResponse, DecryptRequest, EncryptRequest, GenerateRequest,
    KekMetadata,
};
use crate::error::{CryptoError, CryptoResult};
use crate::keygen::{self, DSA_BIT_LENGTH, MIN_RSA_BIT_LENGTH};
use crate::plugin::{CryptoPlugin, PluginSupportType};
use crate::token::{TokenCipher, TokenKey};
use rand::RngCore;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Registry name of the software backend.
pub const PLUGIN_NAME: &str = "simple_crypto";

/// Canonical KEK parameters recorded on bind.
const KEK_ALGORITHM: &str = "aes";
const KEK_BIT_LENGTH: u32 = 128;
const KEK_MODE: &str = "cbc";

/// Symmetric algorithms this backend can generate keys for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SymmetricAlgorithm {
    Aes,
    Des,
    TripleDes,
    HmacSha1,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl SymmetricAlgorithm {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "aes" => Some(Self::Aes),
            "des" => Some(Self::Des),
            "3des" => Some(Self::TripleDes),
            "hmacsha1" => Some(Self::HmacSha1),
            "hmacsha256" => Some(Self::HmacSha256),
            "hmacsha384" => Some(Self::HmacSha384),
            "hmacsha512" => Some(Self::HmacSha512),
            _ => None,
        }
    }

    fn accepts(self, bit_length: u32) -> bool {
        match self {
            Self::Aes => matches!(bit_length, 64 | 128 | 192 | 256),
            Self::Des => bit_length == 64,
            Self::TripleDes => matches!(bit_length, 128 | 192),
            // At least 64 bits and no longer than the hash block.
            Self::HmacSha1 | Self::HmacSha256 => {
                bit_length >= 64 && bit_length <= 512 && bit_length % 8 == 0
            }
            Self::HmacSha384 | Self::HmacSha512 => {
                bit_length >= 64 && bit_length <= 1024 && bit_length % 8 == 0
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AsymmetricAlgorithm {
    Rsa,
    Dsa,
}

impl AsymmetricAlgorithm {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rsa" => Some(Self::Rsa),
            "dsa" => Some(Self::Dsa),
            _ => None,
        }
    }
}

/// Software-only [`CryptoPlugin`].
pub struct SimpleCryptoPlugin {
    master: TokenCipher,
    max_rsa_bit_length: u32,
}

impl SimpleCryptoPlugin {
    /// Builds the plugin from configuration. Fails if the master KEK is not
    /// a valid 32-byte url-safe base64 key.
    pub fn new(config: &SimpleCryptoConfig) -> CryptoResult<Self> {
        let master_kek = TokenKey::from_encoded(&config.kek)
            .map_err(|e| CryptoError::Config(format!("simple_crypto master kek: {e}")))?;
        if config.uses_dev_kek() {
            warn!("simple_crypto is running with the published development master KEK");
        }
        Ok(Self {
            master: TokenCipher::new(&master_kek),
            max_rsa_bit_length: config.max_rsa_bit_length,
        })
    }

    /// Unwraps the tenant key stored in `plugin_meta`.
    fn tenant_cipher(&self, kek_meta: &KekMetadata) -> CryptoResult<TokenCipher> {
        let wrapped = kek_meta
            .plugin_meta
            .as_deref()
            .ok_or_else(|| CryptoError::KekNotBound(kek_meta.tenant_id.clone()))?;

        let tenant_key = Zeroizing::new(self.master.decrypt(wrapped)?);
        let tenant_key = TokenKey::from_slice(&tenant_key)?;
        Ok(TokenCipher::new(&tenant_key))
    }

    fn is_symmetric_supported(algorithm: Option<&str>, bit_length: Option<u32>) -> bool {
        match (algorithm.and_then(SymmetricAlgorithm::parse), bit_length) {
            (Some(alg), Some(bits)) => alg.accepts(bits),
            _ => false,
        }
    }

    fn is_asymmetric_supported(&self, algorithm: Option<&str>, bit_length: Option<u32>) -> bool {
        match (algorithm.and_then(AsymmetricAlgorithm::parse), bit_length) {
            (Some(AsymmetricAlgorithm::Rsa), Some(bits)) => {
                bits >= MIN_RSA_BIT_LENGTH && bits <= self.max_rsa_bit_length && bits % 8 == 0
            }
            (Some(AsymmetricAlgorithm::Dsa), Some(bits)) => bits == DSA_BIT_LENGTH,
            _ => false,
        }
    }

    fn asymmetric_rejection(&self, request: &GenerateRequest) -> CryptoError {
        let detail = match AsymmetricAlgorithm::parse(&request.algorithm) {
            Some(AsymmetricAlgorithm::Rsa) => format!(
                "rsa keys must be {MIN_RSA_BIT_LENGTH} to {} bits in multiples of 8 \
                 (upper bound set by max_rsa_bit_length)",
                self.max_rsa_bit_length
            ),
            Some(AsymmetricAlgorithm::Dsa) => format!("dsa keys must be {DSA_BIT_LENGTH} bits"),
            None => "key pairs are rsa or dsa".to_string(),
        };
        unsupported(request, detail)
    }

    fn wrap(&self, bytes: &[u8], kek_meta: &KekMetadata, tenant_id: &str) -> CryptoResult<CryptoResponse> {
        self.encrypt(&EncryptRequest::new(bytes), kek_meta, tenant_id)
    }
}

fn unsupported(request: &GenerateRequest, detail: impl Into<String>) -> CryptoError {
    CryptoError::UnsupportedAlgorithm {
        algorithm: request.algorithm.clone(),
        bit_length: Some(request.bit_length),
        detail: detail.into(),
    }
}

impl CryptoPlugin for SimpleCryptoPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn encrypt(
        &self,
        request: &EncryptRequest,
        kek_meta: &KekMetadata,
        _tenant_id: &str,
    ) -> CryptoResult<CryptoResponse> {
        let plaintext = request.plaintext_bytes()?;
        let cipher = self.tenant_cipher(kek_meta)?;
        let token = cipher.encrypt(plaintext)?;
        Ok(CryptoResponse::new(token.into_bytes(), None))
    }

    fn decrypt(
        &self,
        request: &DecryptRequest,
        kek_meta: &KekMetadata,
        _kek_meta_extended: Option<&str>,
        _tenant_id: &str,
    ) -> CryptoResult<Vec<u8>> {
        let cipher = self.tenant_cipher(kek_meta)?;
        let token = std::str::from_utf8(&request.encrypted)
            .map_err(|_| CryptoError::Decryption("ciphertext is not a token".to_string()))?;
        cipher.decrypt(token)
    }

    fn bind_kek_metadata(&self, kek_meta: KekMetadata) -> CryptoResult<KekMetadata> {
        if kek_meta.is_bound() {
            return Ok(kek_meta);
        }

        let tenant_key = TokenKey::generate();
        let wrapped = self.master.encrypt(tenant_key.as_bytes())?;
        debug!("created simple_crypto KEK for tenant {}", kek_meta.tenant_id);

        Ok(kek_meta.with_binding(KEK_ALGORITHM, KEK_BIT_LENGTH, KEK_MODE, wrapped))
    }

    fn generate_symmetric(
        &self,
        request: &GenerateRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<CryptoResponse> {
        if !Self::is_symmetric_supported(Some(&request.algorithm), Some(request.bit_length)) {
            return Err(unsupported(
                request,
                "no simple_crypto symmetric key of this algorithm and length",
            ));
        }

        let mut key = Zeroizing::new(vec![0u8; request.byte_length()?]);
        rand::rngs::OsRng.fill_bytes(&mut key);
        self.wrap(&key, kek_meta, tenant_id)
    }

    fn generate_asymmetric(
        &self,
        request: &GenerateRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<AsymmetricResponse> {
        if !self.is_asymmetric_supported(Some(&request.algorithm), Some(request.bit_length)) {
            return Err(self.asymmetric_rejection(request));
        }

        let passphrase = request.passphrase.as_deref();
        let pair = match AsymmetricAlgorithm::parse(&request.algorithm) {
            Some(AsymmetricAlgorithm::Rsa) => keygen::generate_rsa(request.bit_length, passphrase)?,
            Some(AsymmetricAlgorithm::Dsa) if passphrase.is_some() => {
                return Err(CryptoError::InvalidInput(
                    "DSA keys cannot be passphrase protected".to_string(),
                ));
            }
            Some(AsymmetricAlgorithm::Dsa) => keygen::generate_dsa()?,
            None => return Err(self.asymmetric_rejection(request)),
        };
        debug!(
            "generated {}-{} key pair for tenant {tenant_id}",
            request.algorithm, request.bit_length
        );

        let private_key = self.wrap(pair.private_pem.as_bytes(), kek_meta, tenant_id)?;
        let public_key = self.wrap(pair.public_pem.as_bytes(), kek_meta, tenant_id)?;
        let passphrase = passphrase
            .map(|p| self.wrap(p.as_bytes(), kek_meta, tenant_id))
            .transpose()?;

        Ok(AsymmetricResponse {
            private_key,
            public_key,
            passphrase,
        })
    }

    fn supports(
        &self,
        capability: &PluginSupportType,
        algorithm: Option<&str>,
        bit_length: Option<u32>,
        _mode: Option<&str>,
    ) -> bool {
        match capability {
            PluginSupportType::EncryptDecrypt => true,
            PluginSupportType::SymmetricKeyGeneration => {
                Self::is_symmetric_supported(algorithm, bit_length)
            }
            PluginSupportType::AsymmetricKeyGeneration => {
                self.is_asymmetric_supported(algorithm, bit_length)
            }
            PluginSupportType::Unknown(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_matrix_is_literal() {
        let aes = SymmetricAlgorithm::Aes;
        assert!(aes.accepts(64));
        assert!(aes.accepts(128));
        assert!(aes.accepts(192));
        assert!(aes.accepts(256));
        assert!(!aes.accepts(72));
        assert!(!aes.accepts(512));
    }

    #[test]
    fn hmac_bounds_follow_block_size() {
        assert!(SymmetricAlgorithm::HmacSha256.accepts(512));
        assert!(!SymmetricAlgorithm::HmacSha256.accepts(1024));
        assert!(SymmetricAlgorithm::HmacSha512.accepts(1024));
        assert!(!SymmetricAlgorithm::HmacSha512.accepts(56));
        assert!(!SymmetricAlgorithm::HmacSha512.accepts(100));
    }

    #[test]
    fn algorithm_names_are_case_insensitive() {
        assert_eq!(SymmetricAlgorithm::parse("AES"), Some(SymmetricAlgorithm::Aes));
        assert_eq!(
            SymmetricAlgorithm::parse("HmacSHA384"),
            Some(SymmetricAlgorithm::HmacSha384)
        );
        assert_eq!(AsymmetricAlgorithm::parse("RSA"), Some(AsymmetricAlgorithm::Rsa));
        assert_eq!(SymmetricAlgorithm::parse("Camillia"), None);
    }

    #[test]
    fn bad_master_kek_is_config_error() {
        let config = SimpleCryptoConfig {
            kek: "not-a-key".into(),
            ..SimpleCryptoConfig::default()
        };
        let err = SimpleCryptoPlugin::new(&config).err().unwrap();
        assert!(matches!(err, CryptoError::Config(_)));
    }
}
