//! Ordered registry of crypto backends.

use crate::error::{ResourceError, ResourceResult};
use cipherkeep_crypto::p11::{self, P11Library};
use cipherkeep_crypto::{
    simple, CryptoConfig, CryptoPlugin, P11CryptoPlugin, PluginSupportType, SimpleCryptoPlugin,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Registered crypto backends, in selection order.
///
/// Selection is first match: the earliest plugin whose `supports` answers
/// true handles the request.
#[derive(Clone, Default)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn CryptoPlugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the backends named in `enabled_plugins`, in that order.
    ///
    /// `library` supplies the PKCS#11 binding for `p11_crypto`. Any backend
    /// that fails to construct fails the whole registry.
    pub fn from_config(config: &CryptoConfig, library: &dyn P11Library) -> ResourceResult<Self> {
        if config.enabled_plugins.is_empty() {
            return Err(ResourceError::Config("no crypto plugins enabled".to_string()));
        }

        let mut manager = Self::new();
        for name in &config.enabled_plugins {
            let plugin: Arc<dyn CryptoPlugin> = match name.as_str() {
                simple::PLUGIN_NAME => {
                    let simple_config = config.simple_crypto.clone().unwrap_or_default();
                    Arc::new(SimpleCryptoPlugin::new(&simple_config)?)
                }
                p11::PLUGIN_NAME => {
                    let p11_config = config.p11_crypto.as_ref().ok_or_else(|| {
                        ResourceError::Config("p11_crypto enabled without a [p11_crypto] section".to_string())
                    })?;
                    Arc::new(P11CryptoPlugin::new(p11_config, library)?)
                }
                other => {
                    return Err(ResourceError::Config(format!("unknown crypto plugin {other}")));
                }
            };
            manager.register(plugin);
        }
        info!("crypto plugins enabled: {}", manager.names().join(", "));
        Ok(manager)
    }

    /// Appends a backend at the lowest priority.
    pub fn register(&mut self, plugin: Arc<dyn CryptoPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn CryptoPlugin>) -> Self {
        self.register(plugin);
        self
    }

    /// First backend supporting the capability for these parameters.
    pub fn get_plugin(
        &self,
        capability: &PluginSupportType,
        algorithm: Option<&str>,
        bit_length: Option<u32>,
        mode: Option<&str>,
    ) -> ResourceResult<Arc<dyn CryptoPlugin>> {
        let plugin = self
            .plugins
            .iter()
            .find(|p| p.supports(capability, algorithm, bit_length, mode))
            .ok_or_else(|| ResourceError::NoCapablePlugin {
                capability: capability.clone(),
                algorithm: algorithm.map(str::to_string),
                bit_length,
            })?;
        debug!("selected {} for {capability}", plugin.name());
        Ok(Arc::clone(plugin))
    }

    /// Backend registered under `name`, for decrypting stored secrets.
    pub fn get_plugin_by_name(&self, name: &str) -> ResourceResult<Arc<dyn CryptoPlugin>> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(format!("crypto plugin {name}")))
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
