//! Shared fixtures for orchestration tests.

#![allow(dead_code)]

use cipherkeep_crypto::{
    AsymmetricResponse, CryptoError, CryptoPlugin, CryptoResponse, CryptoResult, DecryptRequest,
    EncryptRequest, GenerateRequest, KekMetadata, PluginSupportType, SimpleCryptoConfig,
    SimpleCryptoPlugin,
};
use cipherkeep_resources::{
    MemoryRepository, PluginManager, SecretContainer, SecretRecord, SecretRepository,
    StorageError, StorageResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("cipherkeep_resources=debug,cipherkeep_crypto=debug"))
        .with_test_writer()
        .try_init();
}

pub fn simple_manager() -> PluginManager {
    init_tracing();
    let plugin = SimpleCryptoPlugin::new(&SimpleCryptoConfig::default()).unwrap();
    PluginManager::new().with_plugin(Arc::new(plugin))
}

/// Plugin that only answers capability queries. Every operation fails.
pub struct StubPlugin {
    pub name: &'static str,
    pub capabilities: Vec<PluginSupportType>,
}

impl StubPlugin {
    pub fn new(name: &'static str, capabilities: &[PluginSupportType]) -> Arc<Self> {
        Arc::new(Self {
            name,
            capabilities: capabilities.to_vec(),
        })
    }

    fn refuse<T>(&self) -> CryptoResult<T> {
        Err(CryptoError::UnsupportedOperation(format!("{} is a stub", self.name)))
    }
}

impl CryptoPlugin for StubPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn encrypt(&self, _: &EncryptRequest, _: &KekMetadata, _: &str) -> CryptoResult<CryptoResponse> {
        self.refuse()
    }

    fn decrypt(
        &self,
        _: &DecryptRequest,
        _: &KekMetadata,
        _: Option<&str>,
        _: &str,
    ) -> CryptoResult<Vec<u8>> {
        self.refuse()
    }

    fn bind_kek_metadata(&self, kek_meta: KekMetadata) -> CryptoResult<KekMetadata> {
        Ok(kek_meta)
    }

    fn generate_symmetric(
        &self,
        _: &GenerateRequest,
        _: &KekMetadata,
        _: &str,
    ) -> CryptoResult<CryptoResponse> {
        self.refuse()
    }

    fn generate_asymmetric(
        &self,
        _: &GenerateRequest,
        _: &KekMetadata,
        _: &str,
    ) -> CryptoResult<AsymmetricResponse> {
        self.refuse()
    }

    fn supports(
        &self,
        capability: &PluginSupportType,
        _: Option<&str>,
        _: Option<u32>,
        _: Option<&str>,
    ) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Memory repository that fails chosen writes.
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: MemoryRepository,
    /// Number of `create_secret` calls that succeed before the rest fail.
    pub secrets_before_failure: Option<usize>,
    pub fail_container: bool,
    secret_calls: AtomicUsize,
}

impl FlakyRepository {
    pub fn failing_container() -> Self {
        Self {
            fail_container: true,
            ..Self::default()
        }
    }

    pub fn failing_after_secrets(count: usize) -> Self {
        Self {
            secrets_before_failure: Some(count),
            ..Self::default()
        }
    }
}

impl SecretRepository for FlakyRepository {
    fn find_kek(&self, tenant_id: &str, plugin_name: &str) -> StorageResult<Option<KekMetadata>> {
        self.inner.find_kek(tenant_id, plugin_name)
    }

    fn insert_kek(&self, kek_meta: &KekMetadata) -> StorageResult<()> {
        self.inner.insert_kek(kek_meta)
    }

    fn create_secret(&self, record: &SecretRecord) -> StorageResult<()> {
        let call = self.secret_calls.fetch_add(1, Ordering::SeqCst);
        if self.secrets_before_failure.is_some_and(|limit| call >= limit) {
            return Err(StorageError::Backend("secret table unavailable".into()));
        }
        self.inner.create_secret(record)
    }

    fn get_secret(&self, id: Uuid) -> StorageResult<Option<SecretRecord>> {
        self.inner.get_secret(id)
    }

    fn create_container(&self, container: &SecretContainer) -> StorageResult<()> {
        if self.fail_container {
            return Err(StorageError::Backend("container table unavailable".into()));
        }
        self.inner.create_container(container)
    }

    fn get_container(&self, id: Uuid) -> StorageResult<Option<SecretContainer>> {
        self.inner.get_container(id)
    }
}
