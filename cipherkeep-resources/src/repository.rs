//! Storage collaborator contract and an in-memory implementation.

use crate::error::{StorageError, StorageResult};
use crate::types::{SecretContainer, SecretRecord};
use cipherkeep_crypto::KekMetadata;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Persistence for KEK metadata, secrets and containers.
///
/// Each call is its own unit of work. `insert_kek` must enforce uniqueness
/// on (tenant, plugin) and report a violation as [`StorageError::Conflict`];
/// the orchestrator relies on that to settle concurrent first binds.
pub trait SecretRepository: Send + Sync {
    fn find_kek(&self, tenant_id: &str, plugin_name: &str) -> StorageResult<Option<KekMetadata>>;

    fn insert_kek(&self, kek_meta: &KekMetadata) -> StorageResult<()>;

    fn create_secret(&self, record: &SecretRecord) -> StorageResult<()>;

    fn get_secret(&self, id: Uuid) -> StorageResult<Option<SecretRecord>>;

    fn create_container(&self, container: &SecretContainer) -> StorageResult<()>;

    fn get_container(&self, id: Uuid) -> StorageResult<Option<SecretContainer>>;
}

type KekKey = (String, String);

/// Thread-safe in-memory [`SecretRepository`].
#[derive(Default)]
pub struct MemoryRepository {
    keks: RwLock<HashMap<KekKey, KekMetadata>>,
    secrets: RwLock<HashMap<Uuid, SecretRecord>>,
    containers: RwLock<HashMap<Uuid, SecretContainer>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kek_count(&self) -> StorageResult<usize> {
        Ok(read(&self.keks)?.len())
    }

    pub fn secret_count(&self) -> StorageResult<usize> {
        Ok(read(&self.secrets)?.len())
    }

    pub fn container_count(&self) -> StorageResult<usize> {
        Ok(read(&self.containers)?.len())
    }
}

fn read<T>(lock: &RwLock<T>) -> StorageResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StorageError::Backend("repository lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> StorageResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StorageError::Backend("repository lock poisoned".to_string()))
}

impl SecretRepository for MemoryRepository {
    fn find_kek(&self, tenant_id: &str, plugin_name: &str) -> StorageResult<Option<KekMetadata>> {
        let key = (tenant_id.to_string(), plugin_name.to_string());
        Ok(read(&self.keks)?.get(&key).cloned())
    }

    fn insert_kek(&self, kek_meta: &KekMetadata) -> StorageResult<()> {
        let key = (kek_meta.tenant_id.clone(), kek_meta.plugin_name.clone());
        let mut keks = write(&self.keks)?;
        if keks.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "tenant {} already has a {} KEK",
                kek_meta.tenant_id, kek_meta.plugin_name
            )));
        }
        keks.insert(key, kek_meta.clone());
        Ok(())
    }

    fn create_secret(&self, record: &SecretRecord) -> StorageResult<()> {
        let mut secrets = write(&self.secrets)?;
        if secrets.contains_key(&record.id) {
            return Err(StorageError::Conflict(format!("secret {} exists", record.id)));
        }
        secrets.insert(record.id, record.clone());
        Ok(())
    }

    fn get_secret(&self, id: Uuid) -> StorageResult<Option<SecretRecord>> {
        Ok(read(&self.secrets)?.get(&id).cloned())
    }

    fn create_container(&self, container: &SecretContainer) -> StorageResult<()> {
        let mut containers = write(&self.containers)?;
        if containers.contains_key(&container.id) {
            return Err(StorageError::Conflict(format!(
                "container {} exists",
                container.id
            )));
        }
        containers.insert(container.id, container.clone());
        Ok(())
    }

    fn get_container(&self, id: Uuid) -> StorageResult<Option<SecretContainer>> {
        Ok(read(&self.containers)?.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kek_insert_is_unique_per_tenant_and_plugin() {
        let repo = MemoryRepository::new();
        let meta = KekMetadata::new("t1", "simple_crypto", "label-a");

        repo.insert_kek(&meta).unwrap();
        let err = repo
            .insert_kek(&KekMetadata::new("t1", "simple_crypto", "label-b"))
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        repo.insert_kek(&KekMetadata::new("t1", "p11_crypto", "label-c"))
            .unwrap();
        repo.insert_kek(&KekMetadata::new("t2", "simple_crypto", "label-d"))
            .unwrap();

        assert_eq!(repo.kek_count().unwrap(), 3);
        assert_eq!(
            repo.find_kek("t1", "simple_crypto").unwrap().unwrap().kek_label,
            "label-a"
        );
        assert!(repo.find_kek("t3", "simple_crypto").unwrap().is_none());
    }
}
