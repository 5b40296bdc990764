//! The contract every crypto backend implements.

use crate::dto::{
    AsymmetricResponse, CryptoResponse, DecryptRequest, EncryptRequest, GenerateRequest,
    KekMetadata,
};
use crate::error::CryptoResult;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Capabilities a backend can be asked about.
///
/// Tags this build does not know parse to `Unknown`, which no backend
/// supports. New capabilities can therefore be queried against old plugins.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PluginSupportType {
    EncryptDecrypt,
    SymmetricKeyGeneration,
    AsymmetricKeyGeneration,
    Unknown(String),
}

impl PluginSupportType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::EncryptDecrypt => "ENCRYPT_DECRYPT",
            Self::SymmetricKeyGeneration => "SYMMETRIC_KEY_GENERATION",
            Self::AsymmetricKeyGeneration => "ASYMMETRIC_KEY_GENERATION",
            Self::Unknown(tag) => tag,
        }
    }
}

impl FromStr for PluginSupportType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ENCRYPT_DECRYPT" => Self::EncryptDecrypt,
            "SYMMETRIC_KEY_GENERATION" => Self::SymmetricKeyGeneration,
            "ASYMMETRIC_KEY_GENERATION" => Self::AsymmetricKeyGeneration,
            other => Self::Unknown(other.to_string()),
        })
    }
}

impl fmt::Display for PluginSupportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cryptographic backend: software, HSM, or anything else that can wrap
/// tenant secrets under a per-tenant key-encryption key.
pub trait CryptoPlugin: Send + Sync {
    /// Registry name, also stored in [`KekMetadata::plugin_name`].
    fn name(&self) -> &str;

    /// Encrypts the request's plaintext under the tenant's KEK.
    fn encrypt(
        &self,
        request: &EncryptRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<CryptoResponse>;

    /// Decrypts ciphertext produced by [`CryptoPlugin::encrypt`], returning
    /// the exact bytes that were encrypted.
    fn decrypt(
        &self,
        request: &DecryptRequest,
        kek_meta: &KekMetadata,
        kek_meta_extended: Option<&str>,
        tenant_id: &str,
    ) -> CryptoResult<Vec<u8>>;

    /// Get-or-create for the tenant's KEK. Returns the metadata unchanged if
    /// key material already exists.
    fn bind_kek_metadata(&self, kek_meta: KekMetadata) -> CryptoResult<KekMetadata>;

    /// Generates a symmetric key, returned wrapped under the tenant's KEK.
    fn generate_symmetric(
        &self,
        request: &GenerateRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<CryptoResponse>;

    /// Generates a key pair, each part wrapped under the tenant's KEK.
    fn generate_asymmetric(
        &self,
        request: &GenerateRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<AsymmetricResponse>;

    /// Capability query. Never mutates state.
    fn supports(
        &self,
        capability: &PluginSupportType,
        algorithm: Option<&str>,
        bit_length: Option<u32>,
        mode: Option<&str>,
    ) -> bool;
}

impl<T> CryptoPlugin for Arc<T>
where
    T: CryptoPlugin + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn encrypt(
        &self,
        request: &EncryptRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<CryptoResponse> {
        (**self).encrypt(request, kek_meta, tenant_id)
    }

    fn decrypt(
        &self,
        request: &DecryptRequest,
        kek_meta: &KekMetadata,
        kek_meta_extended: Option<&str>,
        tenant_id: &str,
    ) -> CryptoResult<Vec<u8>> {
        (**self).decrypt(request, kek_meta, kek_meta_extended, tenant_id)
    }

    fn bind_kek_metadata(&self, kek_meta: KekMetadata) -> CryptoResult<KekMetadata> {
        (**self).bind_kek_metadata(kek_meta)
    }

    fn generate_symmetric(
        &self,
        request: &GenerateRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<CryptoResponse> {
        (**self).generate_symmetric(request, kek_meta, tenant_id)
    }

    fn generate_asymmetric(
        &self,
        request: &GenerateRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<AsymmetricResponse> {
        (**self).generate_asymmetric(request, kek_meta, tenant_id)
    }

    fn supports(
        &self,
        capability: &PluginSupportType,
        algorithm: Option<&str>,
        bit_length: Option<u32>,
        mode: Option<&str>,
    ) -> bool {
        (**self).supports(capability, algorithm, bit_length, mode)
    }
}

impl<T> CryptoPlugin for Box<T>
where
    T: CryptoPlugin + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn encrypt(
        &self,
        request: &EncryptRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<CryptoResponse> {
        (**self).encrypt(request, kek_meta, tenant_id)
    }

    fn decrypt(
        &self,
        request: &DecryptRequest,
        kek_meta: &KekMetadata,
        kek_meta_extended: Option<&str>,
        tenant_id: &str,
    ) -> CryptoResult<Vec<u8>> {
        (**self).decrypt(request, kek_meta, kek_meta_extended, tenant_id)
    }

    fn bind_kek_metadata(&self, kek_meta: KekMetadata) -> CryptoResult<KekMetadata> {
        (**self).bind_kek_metadata(kek_meta)
    }

    fn generate_symmetric(
        &self,
        request: &GenerateRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<CryptoResponse> {
        (**self).generate_symmetric(request, kek_meta, tenant_id)
    }

    fn generate_asymmetric(
        &self,
        request: &GenerateRequest,
        kek_meta: &KekMetadata,
        tenant_id: &str,
    ) -> CryptoResult<AsymmetricResponse> {
        (**self).generate_asymmetric(request, kek_meta, tenant_id)
    }

    fn supports(
        &self,
        capability: &PluginSupportType,
        algorithm: Option<&str>,
        bit_length: Option<u32>,
        mode: Option<&str>,
    ) -> bool {
        (**self).supports(capability, algorithm, bit_length, mode)
    }
}
