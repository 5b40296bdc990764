//! In-memory software token.
//!
//! Implements [`P11Library`] and [`P11Session`] with AES-GCM in process
//! memory. Useful for local development and for exercising the HSM plugin
//! end to end without hardware. Key values never leave the emulator, just as
//! on a real token, but they are not protected against a memory dump: this
//! is NOT a security boundary.

use super::session::{
    GcmParams, KeyTemplate, Mechanism, ObjectHandle, P11Library, P11Session,
};
use crate::config::P11CryptoConfig;
use crate::error::{CryptoError, CryptoResult};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::{Aes128, Aes256};
use aes_gcm::{AesGcm, Nonce};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use zeroize::Zeroizing;

type Aes128Gcm16 = AesGcm<Aes128, U16>;
type Aes256Gcm16 = AesGcm<Aes256, U16>;

struct StoredKey {
    template: KeyTemplate,
    value: Zeroizing<Vec<u8>>,
}

#[derive(Default)]
struct TokenState {
    objects: HashMap<u64, StoredKey>,
    next_handle: u64,
    rng_shortfall: usize,
    fail_initialize: Option<String>,
}

/// Emulated PKCS#11 token. Clones share the same object store.
#[derive(Clone, Default)]
pub struct EmulatedHsm {
    state: Arc<Mutex<TokenState>>,
    pin: Option<String>,
}

impl EmulatedHsm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires sessions to log in with `pin`.
    pub fn with_pin(pin: impl Into<String>) -> Self {
        Self {
            pin: Some(pin.into()),
            ..Self::default()
        }
    }

    /// Makes every subsequent `generate_random` return `shortfall` fewer
    /// bytes than requested.
    pub fn set_rng_shortfall(&self, shortfall: usize) -> CryptoResult<()> {
        self.lock()?.rng_shortfall = shortfall;
        Ok(())
    }

    /// Makes `open_session` fail with `reason`, as a broken library would.
    pub fn fail_initialize(&self, reason: impl Into<String>) -> CryptoResult<()> {
        self.lock()?.fail_initialize = Some(reason.into());
        Ok(())
    }

    /// Stores an AES key under `label` directly, bypassing the plugin.
    pub fn import_key(&self, label: &str, value: &[u8]) -> CryptoResult<ObjectHandle> {
        let mut state = self.lock()?;
        let handle = state.insert(KeyTemplate::aes_kek(label, value.len()), value.to_vec());
        Ok(handle)
    }

    /// Number of key objects carrying `label`.
    pub fn count_label(&self, label: &str) -> CryptoResult<usize> {
        let search = KeyTemplate::find_aes(label);
        Ok(self
            .lock()?
            .objects
            .values()
            .filter(|key| key.template.matches(&search))
            .count())
    }

    /// Total number of objects on the token.
    pub fn object_count(&self) -> CryptoResult<usize> {
        Ok(self.lock()?.objects.len())
    }

    fn lock(&self) -> CryptoResult<MutexGuard<'_, TokenState>> {
        self.state
            .lock()
            .map_err(|_| CryptoError::Hsm("emulated token lock poisoned".to_string()))
    }
}

impl TokenState {
    fn insert(&mut self, template: KeyTemplate, value: Vec<u8>) -> ObjectHandle {
        self.next_handle += 1;
        self.objects.insert(
            self.next_handle,
            StoredKey {
                template,
                value: Zeroizing::new(value),
            },
        );
        ObjectHandle(self.next_handle)
    }
}

impl P11Library for EmulatedHsm {
    fn open_session(
        &self,
        _library_path: &str,
        config: &P11CryptoConfig,
    ) -> CryptoResult<Box<dyn P11Session>> {
        if let Some(reason) = self.lock()?.fail_initialize.clone() {
            return Err(CryptoError::HsmInit(format!("C_Initialize failed: {reason}")));
        }
        if let Some(pin) = &self.pin {
            if config.login.as_deref() != Some(pin.as_str()) {
                return Err(CryptoError::HsmInit("C_Login failed: CKR_PIN_INCORRECT".to_string()));
            }
        }
        Ok(Box::new(EmulatedSession { hsm: self.clone() }))
    }
}

/// Session handed out by [`EmulatedHsm`].
pub struct EmulatedSession {
    hsm: EmulatedHsm,
}

impl P11Session for EmulatedSession {
    fn generate_random(&mut self, len: usize) -> CryptoResult<Vec<u8>> {
        let shortfall = self.hsm.lock()?.rng_shortfall;
        let mut bytes = vec![0u8; len.saturating_sub(shortfall)];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Ok(bytes)
    }

    fn find_objects(&mut self, template: &KeyTemplate) -> CryptoResult<Vec<ObjectHandle>> {
        let state = self.hsm.lock()?;
        let mut handles: Vec<ObjectHandle> = state
            .objects
            .iter()
            .filter(|(_, key)| key.template.matches(template))
            .map(|(handle, _)| ObjectHandle(*handle))
            .collect();
        handles.sort_by_key(|h| h.0);
        Ok(handles)
    }

    fn generate_key(
        &mut self,
        mechanism: &Mechanism,
        template: &KeyTemplate,
    ) -> CryptoResult<ObjectHandle> {
        if *mechanism != Mechanism::AesKeyGen {
            return Err(CryptoError::Mechanism(format!(
                "{mechanism:?} cannot generate keys"
            )));
        }
        let len = template
            .value_len
            .ok_or_else(|| CryptoError::Mechanism("CKA_VALUE_LEN is required".to_string()))?;
        if !matches!(len, 16 | 32) {
            return Err(CryptoError::Mechanism(format!(
                "emulated token supports 16 or 32 byte AES keys, got {len}"
            )));
        }

        let mut value = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut value);
        Ok(self.hsm.lock()?.insert(template.clone(), value))
    }

    fn encrypt(
        &mut self,
        key: ObjectHandle,
        data: &[u8],
        mechanism: &Mechanism,
    ) -> CryptoResult<Vec<u8>> {
        let state = self.hsm.lock()?;
        let stored = state
            .objects
            .get(&key.0)
            .ok_or_else(|| CryptoError::Hsm(format!("no object with handle {}", key.0)))?;
        let params = gcm_params(mechanism)?;

        aes_gcm_apply(&stored.value, params, data, Direction::Seal)
    }

    fn decrypt(
        &mut self,
        key: ObjectHandle,
        data: &[u8],
        mechanism: &Mechanism,
    ) -> CryptoResult<Vec<u8>> {
        let state = self.hsm.lock()?;
        let stored = state
            .objects
            .get(&key.0)
            .ok_or_else(|| CryptoError::Hsm(format!("no object with handle {}", key.0)))?;
        let params = gcm_params(mechanism)?;

        aes_gcm_apply(&stored.value, params, data, Direction::Open)
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Seal,
    Open,
}

fn gcm_params(mechanism: &Mechanism) -> CryptoResult<&GcmParams> {
    match mechanism {
        Mechanism::AesGcm(params) => Ok(params),
        other => Err(CryptoError::Mechanism(format!(
            "{other:?} is not an encryption mechanism"
        ))),
    }
}

fn aes_gcm_apply(
    key: &[u8],
    params: &GcmParams,
    data: &[u8],
    direction: Direction,
) -> CryptoResult<Vec<u8>> {
    if params.iv.len() != 16 || params.iv_len != 16 || params.iv_bits != 128 {
        return Err(CryptoError::Mechanism(format!(
            "emulated token requires a 16-byte GCM IV, got {} bytes",
            params.iv.len()
        )));
    }
    if params.tag_bits != 128 {
        return Err(CryptoError::Mechanism(format!(
            "emulated token requires 128-bit GCM tags, got {}",
            params.tag_bits
        )));
    }

    let nonce = Nonce::<U16>::from_slice(&params.iv);
    let payload = Payload {
        msg: data,
        aad: &params.aad,
    };
    let invalid_key = |_| CryptoError::Mechanism(format!("bad AES key length {}", key.len()));

    let result = match (key.len(), direction) {
        (16, Direction::Seal) => Aes128Gcm16::new_from_slice(key)
            .map_err(invalid_key)?
            .encrypt(nonce, payload),
        (16, Direction::Open) => Aes128Gcm16::new_from_slice(key)
            .map_err(invalid_key)?
            .decrypt(nonce, payload),
        (32, Direction::Seal) => Aes256Gcm16::new_from_slice(key)
            .map_err(invalid_key)?
            .encrypt(nonce, payload),
        (32, Direction::Open) => Aes256Gcm16::new_from_slice(key)
            .map_err(invalid_key)?
            .decrypt(nonce, payload),
        (len, _) => {
            return Err(CryptoError::Mechanism(format!("bad AES key length {len}")));
        }
    };

    result.map_err(|_| match direction {
        Direction::Seal => CryptoError::Encryption("AES-GCM seal failed".to_string()),
        Direction::Open => {
            CryptoError::Decryption("AES-GCM open failed (wrong key or tampered data)".to_string())
        }
    })
}
