//! Pluggable crypto backends for CipherKeep.
//!
//! Every secret is encrypted under a per-tenant key-encryption key (KEK).
//! Backends implement [`CryptoPlugin`] and differ in where that KEK lives:
//!
//! - [`SimpleCryptoPlugin`]: software only. A configured master KEK wraps a
//!   random tenant key, and the wrapped key is stored with the tenant's KEK
//!   metadata. Secrets are sealed as authenticated, timestamped tokens.
//!
//! - [`P11CryptoPlugin`]: the tenant KEK is an AES key generated inside a
//!   PKCS#11 token and never leaves it. Secrets are encrypted with AES-GCM
//!   and the IV travels back to the caller as `kek_meta_extended`.
//!
//! # Architecture
//!
//! Callers bind a tenant's [`KekMetadata`] once (idempotent, get-or-create)
//! and persist the returned record. Every later call hands the bound record
//! back to the plugin, which keeps no per-tenant state of its own.
//!
//! Hardware access goes through the [`p11::P11Library`] and
//! [`p11::P11Session`] traits, so a vendor binding, the in-memory
//! [`p11::EmulatedHsm`], or a test double can back the HSM plugin.

pub mod config;
pub mod dto;
mod error;
pub mod keygen;
pub mod p11;
pub mod plugin;
pub mod simple;
pub mod token;

pub use config::{CryptoConfig, P11CryptoConfig, SimpleCryptoConfig, DEV_MASTER_KEK};
pub use dto::{
    AsymmetricResponse, CryptoResponse, DecryptRequest, EncryptRequest, GenerateRequest,
    KekMetadata, Plaintext,
};
pub use error::{CryptoError, CryptoResult, ErrorKind};
pub use p11::P11CryptoPlugin;
pub use plugin::{CryptoPlugin, PluginSupportType};
pub use simple::SimpleCryptoPlugin;
pub use token::{TokenCipher, TokenKey};
