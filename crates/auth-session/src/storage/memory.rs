//! In-memory storage.
//!
//! Used for ephemeral sessions and as the storage double in tests.
//! [`MemorySecureStore`] can simulate a locked keystore, per-entry write
//! failures and slow writes.

use super::{KeyValueStore, SecureStore};
use crate::errors::StorageError;
use async_trait::async_trait;
use common::secret::SecretString;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Process-local secure store.
#[derive(Debug, Default)]
pub struct MemorySecureStore {
    entries: RwLock<HashMap<String, SecretString>>,
    locked: AtomicBool,
    failing_writes: RwLock<HashSet<String>>,
    slow_writes: RwLock<HashMap<String, Duration>>,
    write_count: AtomicUsize,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny every operation until [`unlock`](Self::unlock) is called.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    /// Make writes to `key` fail with an I/O error.
    pub async fn fail_writes_to(&self, key: &str) {
        self.failing_writes.write().await.insert(key.to_string());
    }

    /// Make writes to `key` take `delay` before they land.
    pub async fn delay_writes_to(&self, key: &str, delay: Duration) {
        self.slow_writes.write().await.insert(key.to_string(), delay);
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    fn check_unlocked(&self) -> Result<(), StorageError> {
        if self.locked.load(Ordering::SeqCst) {
            return Err(StorageError::AccessDenied("secure store is locked".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>, StorageError> {
        self.check_unlocked()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &SecretString) -> Result<(), StorageError> {
        self.check_unlocked()?;
        let delay = self.slow_writes.read().await.get(key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_writes.read().await.contains(key) {
            return Err(StorageError::Io(format!("simulated write failure for '{key}'")));
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.check_unlocked()?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Process-local general store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        self.documents.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.documents.write().await.remove(key);
        Ok(())
    }
}
