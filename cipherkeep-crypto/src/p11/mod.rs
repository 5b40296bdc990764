//! PKCS#11 backend.

pub mod emulated;
pub mod meta;
mod plugin;
pub mod session;

pub use emulated::EmulatedHsm;
pub use meta::ExtendedMeta;
pub use plugin::{BLOCK_SIZE, P11CryptoPlugin, PLUGIN_NAME};
pub use session::{
    GcmParams, KeyTemplate, KeyType, Mechanism, ObjectClass, ObjectHandle, P11Library, P11Session,
};
