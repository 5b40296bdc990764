//! HSM backend.
//!
//! Tenant KEKs are AES keys generated inside the token and found again by
//! label; they never leave the hardware. Secrets are encrypted with
//! AES-GCM under a fresh IV drawn from the token's RNG, and the IV is
//! returned to the caller in `kek_meta_extended`.

use super::meta::ExtendedMeta;
use super::session::{GcmParams, KeyTemplate, Mechanism, ObjectHandle, P11Library, P11Session};
use crate::config::P11CryptoConfig;
use crate::dto::{
    AsymmetricResponse, CryptoResponse, DecryptRequest, EncryptRequest, GenerateRequest,
    KekMetadata,
};
use crate::error::{CryptoError, CryptoResult};
use crate::plugin::{CryptoPlugin, PluginSupportType};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Registry name of the HSM backend.
pub const PLUGIN_NAME: &str = "p11_crypto";

/// AES block size in bytes; also the IV length.
pub const BLOCK_SIZE: usize = 16;

const KEK_ALGORITHM: &str = "AES";
const KEK_MODE: &str = "GCM";

/// PKCS#11-backed [`CryptoPlugin`].
///
/// One long-lived session is opened at construction and shared by all
/// callers behind a mutex, so at most one operation is in flight on it.
pub struct P11CryptoPlugin {
    session: Mutex<Box<dyn P11Session>>,
    block_size: usize,
    kek_length_bytes: usize,
    kek_bit_length: u32,
    gcm_tag_bits: u64,
}

impl P11CryptoPlugin {
    /// Opens and logs into the configured token.
    ///
    /// Fails immediately if no library path is configured or the library
    /// cannot be initialized; there is no lazy retry on first use.
    pub fn new(config: &P11CryptoConfig, library: &dyn P11Library) -> CryptoResult<Self> {
        let library_path = config
            .library_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .ok_or_else(|| CryptoError::Config("p11_crypto library_path is required".to_string()))?;
        let kek_bit_length = kek_bit_length(config.kek_length_bytes)?;

        let session = library
            .open_session(library_path, config)
            .map_err(|e| match e {
                CryptoError::HsmInit(_) => e,
                other => CryptoError::HsmInit(other.to_string()),
            })?;
        info!("opened PKCS#11 session via {library_path} on slot {}", config.slot_id);

        Ok(Self {
            session: Mutex::new(session),
            block_size: BLOCK_SIZE,
            kek_length_bytes: config.kek_length_bytes,
            kek_bit_length,
            gcm_tag_bits: config.gcm_tag_bits,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Looks up the tenant KEK by label.
    ///
    /// Returns `None` when no key exists and fails when more than one does:
    /// labels are unique per tenant, so duplicates mean the token state is
    /// corrupt and picking one could silently use the wrong key.
    pub fn get_key_handle(&self, label: &str) -> CryptoResult<Option<ObjectHandle>> {
        let mut session = self.lock_session()?;
        find_key(&mut **session, label)
    }

    /// Draws one block of IV from the token RNG.
    pub fn generate_iv(&self) -> CryptoResult<Vec<u8>> {
        let mut session = self.lock_session()?;
        random_bytes(&mut **session, self.block_size)
    }

    /// Builds `CK_AES_GCM_PARAMS` for `iv`.
    pub fn build_gcm_params(&self, iv: &[u8]) -> GcmParams {
        GcmParams::new(iv, self.gcm_tag_bits)
    }

    fn lock_session(&self) -> CryptoResult<MutexGuard<'_, Box<dyn P11Session>>> {
        self.session
            .lock()
            .map_err(|_| CryptoError::Hsm("PKCS#11 session lock poisoned".to_string()))
    }

    fn unwrap_key<S: P11Session + ?Sized>(
        session: &mut S,
        kek_meta: &KekMetadata,
    ) -> CryptoResult<ObjectHandle> {
        let label = kek_label(kek_meta)?;
        find_key(session, label)?
            .ok_or_else(|| CryptoError::KekNotBound(kek_meta.tenant_id.clone()))
    }

    fn encrypt_with<S: P11Session + ?Sized>(
        &self,
        session: &mut S,
        plaintext: &[u8],
        kek_meta: &KekMetadata,
    ) -> CryptoResult<CryptoResponse> {
        let iv = random_bytes(session, self.block_size)?;
        let key = Self::unwrap_key(session, kek_meta)?;
        let mechanism = Mechanism::AesGcm(self.build_gcm_params(&iv));

        let cypher_text = session.encrypt(key, plaintext, &mechanism)?;
        let kek_meta_extended = ExtendedMeta::new(&iv).encode()?;
        Ok(CryptoResponse::new(cypher_text, Some(kek_meta_extended)))
    }
}

impl CryptoPlugin for P11CryptoPlugin {
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
        let mut session = self.lock_session()?;
        self.encrypt_with(&mut **session, plaintext, kek_meta)
    }

    fn decrypt(
        &self,
        request: &DecryptRequest,
        kek_meta: &KekMetadata,
        kek_meta_extended: Option<&str>,
        _tenant_id: &str,
    ) -> CryptoResult<Vec<u8>> {
        let mut session = self.lock_session()?;
        let key = Self::unwrap_key(&mut **session, kek_meta)?;

        let raw = kek_meta_extended.ok_or_else(|| {
            CryptoError::InvalidInput("p11_crypto ciphertext requires kek_meta_extended".to_string())
        })?;
        let meta = ExtendedMeta::decode(raw)?;
        let mechanism = Mechanism::AesGcm(self.build_gcm_params(&meta.iv));
        session.decrypt(key, &request.encrypted, &mechanism)
    }

    fn bind_kek_metadata(&self, kek_meta: KekMetadata) -> CryptoResult<KekMetadata> {
        let label = kek_label(&kek_meta)?.to_string();

        // Find and generate under one lock so concurrent first use of a
        // label cannot create two keys.
        let mut session = self.lock_session()?;
        if find_key(&mut **session, &label)?.is_some() {
            return Ok(kek_meta);
        }

        let template = KeyTemplate::aes_kek(&label, self.kek_length_bytes);
        session.generate_key(&Mechanism::AesKeyGen, &template)?;
        info!("generated HSM KEK {label} for tenant {}", kek_meta.tenant_id);

        Ok(kek_meta.with_binding(
            KEK_ALGORITHM,
            self.kek_bit_length,
            KEK_MODE,
            label,
        ))
    }

    fn generate_symmetric(
        &self,
        request: &GenerateRequest,
        kek_meta: &KekMetadata,
        _tenant_id: &str,
    ) -> CryptoResult<CryptoResponse> {
        let byte_length = request.byte_length()?;

        let mut session = self.lock_session()?;
        let key = Zeroizing::new(random_bytes(&mut **session, byte_length)?);
        debug!("drew {byte_length} key bytes from HSM RNG for {}", request.algorithm);
        self.encrypt_with(&mut **session, &key, kek_meta)
    }

    fn generate_asymmetric(
        &self,
        request: &GenerateRequest,
        _kek_meta: &KekMetadata,
        _tenant_id: &str,
    ) -> CryptoResult<AsymmetricResponse> {
        Err(CryptoError::UnsupportedOperation(format!(
            "{PLUGIN_NAME} cannot generate {} key pairs",
            request.algorithm
        )))
    }

    fn supports(
        &self,
        capability: &PluginSupportType,
        _algorithm: Option<&str>,
        _bit_length: Option<u32>,
        _mode: Option<&str>,
    ) -> bool {
        matches!(
            capability,
            PluginSupportType::EncryptDecrypt | PluginSupportType::SymmetricKeyGeneration
        )
    }
}

/// Bit length of an AES KEK of `bytes` bytes; only 16, 24 and 32 are valid.
fn kek_bit_length(bytes: usize) -> CryptoResult<u32> {
    if !matches!(bytes, 16 | 24 | 32) {
        return Err(CryptoError::Config(format!(
            "p11_crypto kek_length_bytes must be 16, 24 or 32, got {bytes}"
        )));
    }
    u32::try_from(bytes * 8).map_err(|e| CryptoError::Config(e.to_string()))
}

fn kek_label(kek_meta: &KekMetadata) -> CryptoResult<&str> {
    if kek_meta.kek_label.is_empty() {
        return Err(CryptoError::InvalidInput(format!(
            "KEK metadata for tenant {} has no label",
            kek_meta.tenant_id
        )));
    }
    Ok(&kek_meta.kek_label)
}

fn find_key<S: P11Session + ?Sized>(session: &mut S, label: &str) -> CryptoResult<Option<ObjectHandle>> {
    let handles = session.find_objects(&KeyTemplate::find_aes(label))?;
    match handles.as_slice() {
        [] => Ok(None),
        [handle] => Ok(Some(*handle)),
        _ => Err(CryptoError::DuplicateKeyLabel {
            label: label.to_string(),
            count: handles.len(),
        }),
    }
}

/// Random bytes from the token. A short read is an error, never a
/// shorter key or IV.
fn random_bytes<S: P11Session + ?Sized>(session: &mut S, len: usize) -> CryptoResult<Vec<u8>> {
    let bytes = session.generate_random(len)?;
    if bytes.len() != len {
        return Err(CryptoError::EntropyUnderrun {
            requested: len,
            received: bytes.len(),
        });
    }
    Ok(bytes)
}
