//! Credential storage for the market portal client.
//!
//! This crate provides:
//! - A `SecureStorage` key-value trait with file and in-memory backends
//! - The session data model shared with the auth crate
//! - `CredentialStore`, which persists a whole session as one atomic record

mod credentials;
mod file;
mod keys;
mod memory;
mod models;
mod traits;

pub use credentials::{CredentialStore, PersistedSession};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use models::{AdminLevel, KycStatus, Role, Session, User};
pub use traits::SecureStorage;

use portal_config_and_utils::Paths;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error (corrupt or foreign data)
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default durable storage backend under the given paths.
pub fn create_storage(paths: &Paths) -> StorageResult<Box<dyn SecureStorage>> {
    let storage = FileStorage::new(paths.credentials_file())?;
    Ok(Box::new(storage))
}

/// Create a `CredentialStore` backed by the default durable storage.
pub fn create_credential_store(paths: &Paths) -> StorageResult<CredentialStore> {
    let storage = create_storage(paths)?;
    Ok(CredentialStore::new(storage))
}
