//! Shared helpers for crypto plugin integration tests.
//!
//! `MockHsm` is a scripted PKCS#11 double: tests decide what the RNG,
//! object search and cipher calls return, then inspect the recorded calls.

#![allow(dead_code)]

use cipherkeep_crypto::p11::{KeyTemplate, Mechanism, ObjectHandle, P11Library, P11Session};
use cipherkeep_crypto::{CryptoError, CryptoResult, KekMetadata, P11CryptoConfig};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("cipherkeep_crypto=debug"))
        .with_test_writer()
        .try_init();
}

/// One recorded session call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    GenerateRandom(usize),
    FindObjects(String),
    GenerateKey(Mechanism, KeyTemplate),
    Encrypt(ObjectHandle, Vec<u8>, Mechanism),
    Decrypt(ObjectHandle, Vec<u8>, Mechanism),
}

#[derive(Default)]
struct Script {
    random: VecDeque<Vec<u8>>,
    found: Vec<ObjectHandle>,
    encrypt_output: Vec<u8>,
    decrypt_output: Vec<u8>,
    calls: Vec<Call>,
}

/// Scripted token. Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct MockHsm {
    script: Arc<Mutex<Script>>,
}

impl MockHsm {
    /// A token holding one key, returning `[1, 2, 3, 4, 5]` from encrypt
    /// and `b"defg"` from decrypt.
    pub fn with_one_key() -> Self {
        let hsm = Self::default();
        hsm.set_found(1);
        hsm.set_encrypt_output(&[1, 2, 3, 4, 5]);
        hsm.set_decrypt_output(b"defg");
        hsm
    }

    /// Queues the next `generate_random` result. When the queue is empty the
    /// session answers with `1, 2, 3, ...` of the requested length.
    pub fn push_random(&self, bytes: &[u8]) {
        self.script.lock().unwrap().random.push_back(bytes.to_vec());
    }

    /// Makes `find_objects` return `count` handles.
    pub fn set_found(&self, count: u64) {
        self.script.lock().unwrap().found = (1..=count).map(ObjectHandle).collect();
    }

    pub fn set_encrypt_output(&self, bytes: &[u8]) {
        self.script.lock().unwrap().encrypt_output = bytes.to_vec();
    }

    pub fn set_decrypt_output(&self, bytes: &[u8]) {
        self.script.lock().unwrap().decrypt_output = bytes.to_vec();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Lengths passed to every `generate_random` call, in order.
    pub fn random_requests(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::GenerateRandom(len) => Some(len),
                _ => None,
            })
            .collect()
    }

    pub fn generated_keys(&self) -> Vec<KeyTemplate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::GenerateKey(_, template) => Some(template),
                _ => None,
            })
            .collect()
    }
}

impl P11Library for MockHsm {
    fn open_session(
        &self,
        _library_path: &str,
        _config: &P11CryptoConfig,
    ) -> CryptoResult<Box<dyn P11Session>> {
        Ok(Box::new(MockSession {
            script: Arc::clone(&self.script),
        }))
    }
}

struct MockSession {
    script: Arc<Mutex<Script>>,
}

impl P11Session for MockSession {
    fn generate_random(&mut self, len: usize) -> CryptoResult<Vec<u8>> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::GenerateRandom(len));
        Ok(script
            .random
            .pop_front()
            .unwrap_or_else(|| (1..=len).map(|b| b as u8).collect()))
    }

    fn find_objects(&mut self, template: &KeyTemplate) -> CryptoResult<Vec<ObjectHandle>> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::FindObjects(template.label.clone()));
        Ok(script.found.clone())
    }

    fn generate_key(
        &mut self,
        mechanism: &Mechanism,
        template: &KeyTemplate,
    ) -> CryptoResult<ObjectHandle> {
        let mut script = self.script.lock().unwrap();
        script
            .calls
            .push(Call::GenerateKey(mechanism.clone(), template.clone()));
        Ok(ObjectHandle(99))
    }

    fn encrypt(
        &mut self,
        key: ObjectHandle,
        data: &[u8],
        mechanism: &Mechanism,
    ) -> CryptoResult<Vec<u8>> {
        let mut script = self.script.lock().unwrap();
        script
            .calls
            .push(Call::Encrypt(key, data.to_vec(), mechanism.clone()));
        Ok(script.encrypt_output.clone())
    }

    fn decrypt(
        &mut self,
        key: ObjectHandle,
        data: &[u8],
        mechanism: &Mechanism,
    ) -> CryptoResult<Vec<u8>> {
        let mut script = self.script.lock().unwrap();
        script
            .calls
            .push(Call::Decrypt(key, data.to_vec(), mechanism.clone()));
        Ok(script.decrypt_output.clone())
    }
}

/// A library that cannot be loaded.
pub struct BrokenLibrary;

impl P11Library for BrokenLibrary {
    fn open_session(
        &self,
        library_path: &str,
        _config: &P11CryptoConfig,
    ) -> CryptoResult<Box<dyn P11Session>> {
        Err(CryptoError::Hsm(format!("cannot load {library_path}")))
    }
}

pub fn p11_config() -> P11CryptoConfig {
    P11CryptoConfig {
        library_path: Some("/usr/lib/softhsm/libsofthsm2.so".into()),
        login: Some("1234".into()),
        ..P11CryptoConfig::default()
    }
}

pub fn kek_meta(tenant: &str, plugin: &str) -> KekMetadata {
    KekMetadata::new(tenant, plugin, format!("{tenant}-kek"))
}
