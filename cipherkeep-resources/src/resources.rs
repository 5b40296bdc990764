//! Secret operations on behalf of a tenant.
//!
//! Each operation selects a backend through the [`PluginManager`], makes
//! sure the tenant has a KEK for it, calls the backend, and persists the
//! result through the [`SecretRepository`]. Writes are not transactional:
//! when a later write fails after an earlier one landed, the caller gets
//! [`ResourceError::PartialFailure`] naming what was already stored.

use crate::error::{PersistStage, ResourceError, ResourceResult, StorageError};
use crate::manager::PluginManager;
use crate::repository::SecretRepository;
use crate::types::{
    ContainerSecretRef, DecryptedSecret, EncryptedDatum, SecretContainer, SecretRecord,
    SecretRole, SecretSpec,
};
use chrono::Utc;
use cipherkeep_crypto::{
    CryptoError, CryptoPlugin, CryptoResponse, DecryptRequest, EncryptRequest, KekMetadata,
    Plaintext, PluginSupportType,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Returns the tenant's KEK for `plugin`, creating it on first use.
///
/// Two callers racing on first use may both ask the backend for a key; the
/// repository's unique constraint picks the winner and the loser re-reads
/// and adopts it.
pub fn bind_kek(
    plugin: &dyn CryptoPlugin,
    tenant_id: &str,
    repo: &dyn SecretRepository,
) -> ResourceResult<KekMetadata> {
    if let Some(existing) = repo.find_kek(tenant_id, plugin.name())? {
        return Ok(existing);
    }

    let label = format!("tenant-kek-{}", Uuid::new_v4());
    let bound = plugin.bind_kek_metadata(KekMetadata::new(tenant_id, plugin.name(), label))?;

    match repo.insert_kek(&bound) {
        Ok(()) => {
            info!("bound {} KEK {} for tenant {tenant_id}", plugin.name(), bound.kek_label);
            Ok(bound)
        }
        Err(StorageError::Conflict(_)) => {
            warn!(
                "concurrent KEK bind for tenant {tenant_id}; discarding {}",
                bound.kek_label
            );
            repo.find_kek(tenant_id, plugin.name())?.ok_or_else(|| {
                ResourceError::NotFound(format!("KEK for tenant {tenant_id} after conflict"))
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Encrypts `payload` for the tenant and stores it.
pub fn store_secret(
    payload: impl Into<Plaintext>,
    content_type: &str,
    tenant_id: &str,
    manager: &PluginManager,
    repo: &dyn SecretRepository,
) -> ResourceResult<SecretRecord> {
    let plugin = manager.get_plugin(&PluginSupportType::EncryptDecrypt, None, None, None)?;
    let kek = bind_kek(&*plugin, tenant_id, repo)?;

    let response = plugin.encrypt(&EncryptRequest::new(payload), &kek, tenant_id)?;
    let record = new_record(response, &kek, content_type, None);
    repo.create_secret(&record)?;

    debug!("stored secret {} for tenant {tenant_id}", record.id);
    Ok(record)
}

/// Loads and decrypts a stored secret.
///
/// Secrets owned by another tenant are reported as not found.
pub fn get_secret(
    secret_id: Uuid,
    tenant_id: &str,
    manager: &PluginManager,
    repo: &dyn SecretRepository,
) -> ResourceResult<DecryptedSecret> {
    let record = repo
        .get_secret(secret_id)?
        .filter(|r| r.tenant_id == tenant_id)
        .ok_or_else(|| ResourceError::NotFound(format!("secret {secret_id}")))?;

    let datum = &record.datum;
    let plugin = manager.get_plugin_by_name(&datum.plugin_name)?;
    let kek = repo
        .find_kek(tenant_id, &datum.plugin_name)?
        .filter(|k| k.kek_label == datum.kek_label)
        .ok_or_else(|| CryptoError::KekNotBound(tenant_id.to_string()))?;

    let payload = plugin.decrypt(
        &DecryptRequest::new(datum.cypher_text.clone()),
        &kek,
        datum.kek_meta_extended.as_deref(),
        tenant_id,
    )?;

    Ok(DecryptedSecret {
        content_type: record.content_type,
        payload,
    })
}

/// Generates a symmetric key for the tenant and stores it.
pub fn generate_symmetric_secret(
    spec: &SecretSpec,
    content_type: &str,
    tenant_id: &str,
    manager: &PluginManager,
    repo: &dyn SecretRepository,
) -> ResourceResult<SecretRecord> {
    spec.validate()?;
    let plugin = manager.get_plugin(
        &PluginSupportType::SymmetricKeyGeneration,
        Some(&spec.algorithm),
        Some(spec.bit_length),
        spec.mode.as_deref(),
    )?;
    let kek = bind_kek(&*plugin, tenant_id, repo)?;

    let response = plugin.generate_symmetric(&spec.to_generate_request(), &kek, tenant_id)?;
    let record = new_record(response, &kek, content_type, Some(spec));
    repo.create_secret(&record)?;

    info!(
        "generated {}-{} secret {} for tenant {tenant_id}",
        spec.algorithm, spec.bit_length, record.id
    );
    Ok(record)
}

/// Generates a key pair and stores it as a container of two or three
/// secrets: public key, private key, and the passphrase when one was
/// requested.
pub fn generate_asymmetric_secret(
    spec: &SecretSpec,
    content_type: &str,
    tenant_id: &str,
    manager: &PluginManager,
    repo: &dyn SecretRepository,
) -> ResourceResult<SecretContainer> {
    spec.validate()?;
    let plugin = manager.get_plugin(
        &PluginSupportType::AsymmetricKeyGeneration,
        Some(&spec.algorithm),
        Some(spec.bit_length),
        spec.mode.as_deref(),
    )?;
    let kek = bind_kek(&*plugin, tenant_id, repo)?;

    let generated = plugin.generate_asymmetric(&spec.to_generate_request(), &kek, tenant_id)?;

    let private = new_record(generated.private_key, &kek, content_type, Some(spec));
    repo.create_secret(&private)?;
    let mut written = vec![private.id];

    let public = new_record(generated.public_key, &kek, content_type, Some(spec));
    persist(repo.create_secret(&public), PersistStage::PublicKey, &written)?;
    written.push(public.id);

    let mut secret_refs = vec![
        secret_ref(SecretRole::PublicKey, public.id),
        secret_ref(SecretRole::PrivateKey, private.id),
    ];

    if let Some(passphrase) = generated.passphrase {
        let record = new_record(passphrase, &kek, content_type, Some(spec));
        persist(repo.create_secret(&record), PersistStage::Passphrase, &written)?;
        written.push(record.id);
        secret_refs.push(secret_ref(SecretRole::PrivateKeyPassphrase, record.id));
    }

    let container = SecretContainer {
        id: Uuid::new_v4(),
        tenant_id: tenant_id.to_string(),
        container_type: spec.algorithm.to_ascii_lowercase(),
        secret_refs,
        created_at: Utc::now(),
    };
    persist(repo.create_container(&container), PersistStage::Container, &written)?;

    info!(
        "generated {}-{} container {} ({} parts) for tenant {tenant_id}",
        container.container_type,
        spec.bit_length,
        container.id,
        container.secret_refs.len()
    );
    Ok(container)
}

fn new_record(
    response: CryptoResponse,
    kek: &KekMetadata,
    content_type: &str,
    spec: Option<&SecretSpec>,
) -> SecretRecord {
    SecretRecord {
        id: Uuid::new_v4(),
        tenant_id: kek.tenant_id.clone(),
        algorithm: spec.map(|s| s.algorithm.clone()),
        bit_length: spec.map(|s| s.bit_length),
        mode: spec.and_then(|s| s.mode.clone()),
        content_type: content_type.to_string(),
        datum: EncryptedDatum {
            cypher_text: response.cypher_text,
            kek_meta_extended: response.kek_meta_extended,
            plugin_name: kek.plugin_name.clone(),
            kek_label: kek.kek_label.clone(),
        },
        created_at: Utc::now(),
    }
}

fn secret_ref(role: SecretRole, secret_id: Uuid) -> ContainerSecretRef {
    ContainerSecretRef {
        name: role.as_str().to_string(),
        secret_id,
    }
}

fn persist(
    result: Result<(), StorageError>,
    stage: PersistStage,
    written: &[Uuid],
) -> ResourceResult<()> {
    result.map_err(|source| {
        warn!("{stage} write failed with {} secrets already stored", written.len());
        ResourceError::PartialFailure {
            stage,
            written: written.to_vec(),
            source,
        }
    })
}
