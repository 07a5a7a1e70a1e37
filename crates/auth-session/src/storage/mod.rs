//! Storage collaborators.
//!
//! Two distinct traits, because their guarantees differ:
//!
//! - [`SecureStore`] holds credentials (access, refresh and ID tokens). Values
//!   are `SecretString` and implementations are expected to keep them
//!   confidential (OS keystore, private files).
//! - [`KeyValueStore`] holds non-secret application state (the identity
//!   snapshot and the JWKS cache envelope) as JSON.
//!
//! Do not collapse them into one abstraction: a general store is allowed to
//! be world-readable or synced, a secure store is not.

pub mod file;
pub mod memory;

use crate::errors::StorageError;
use async_trait::async_trait;
use common::secret::SecretString;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use file::{FileSecureStore, FileStore};
pub use memory::{MemorySecureStore, MemoryStore};

/// Secure key-value storage for credentials.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Read an entry. `Ok(None)` when it does not exist.
    async fn get(&self, key: &str) -> Result<Option<SecretString>, StorageError>;

    /// Create or overwrite an entry.
    async fn set(&self, key: &str, value: &SecretString) -> Result<(), StorageError>;

    /// Delete an entry. Deleting a missing entry succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// General persisted storage for non-secret JSON documents.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a document. `Ok(None)` when it does not exist.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError>;

    /// Create or overwrite a document.
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError>;

    /// Remove a document. Removing a missing document succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read and deserialize a typed document.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and write a typed document.
pub async fn save_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    store.put(key, serde_json::to_value(value)?).await
}

/// Entry names must be plain file-safe identifiers.
pub(crate) fn check_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::Io(format!("invalid storage key '{key}'")))
    }
}
