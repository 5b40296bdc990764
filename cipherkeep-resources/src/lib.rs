//! Secret orchestration for CipherKeep.
//!
//! Sits between the API layer and the crypto backends:
//! - [`PluginManager`] picks the first registered backend that supports a
//!   request (capability negotiation)
//! - [`SecretRepository`] is the storage collaborator; [`MemoryRepository`]
//!   is the in-process implementation
//! - [`resources`] binds tenant KEKs on first use, encrypts and persists
//!   secrets, and assembles generated key pairs into containers

pub mod error;
pub mod manager;
pub mod repository;
pub mod resources;
pub mod types;

pub use error::{PersistStage, ResourceError, ResourceResult, StorageError, StorageResult};
pub use manager::PluginManager;
pub use repository::{MemoryRepository, SecretRepository};
pub use types::*;
