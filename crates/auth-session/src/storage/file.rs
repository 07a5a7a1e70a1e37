//! File-backed storage.
//!
//! One file per entry. Writes go to a sibling temp file that is renamed over
//! the target, so readers see either the old or the new content, never a
//! torn write. On Unix the secure store keeps its directory at `0700` and its
//! files at `0600`.

use super::{check_key, KeyValueStore, SecureStore};
use crate::errors::StorageError;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Credential files in a private directory.
#[derive(Debug, Clone)]
pub struct FileSecureStore {
    dir: PathBuf,
}

impl FileSecureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        check_key(key)?;
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(SecretString::from(contents))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &SecretString) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        ensure_dir(&self.dir, true).await?;
        write_atomic(&path, value.expose_secret().as_bytes(), true).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        remove_if_exists(&self.path_for(key)?).await
    }
}

/// JSON documents in a directory, one `<key>.json` per document.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        check_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec_pretty(&value)?;
        ensure_dir(&self.dir, false).await?;
        write_atomic(&path, &bytes, false).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        remove_if_exists(&self.path_for(key)?).await
    }
}

async fn ensure_dir(dir: &Path, private: bool) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(dir).await?;
    if private {
        set_mode(dir, 0o700).await?;
    }
    Ok(())
}

async fn write_atomic(path: &Path, bytes: &[u8], private: bool) -> Result<(), StorageError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    write_new(&tmp, bytes, private).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        // Leave no stray temp file holding a credential behind
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    debug!(target: "auth.storage", path = %path.display(), "Entry written");
    Ok(())
}

/// Write `bytes` to a freshly created file. A private file is `0600` from
/// the moment it exists.
async fn write_new(path: &Path, bytes: &[u8], private: bool) -> Result<(), StorageError> {
    remove_if_exists(path).await?;
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    if private {
        restrict(&mut options);
    }
    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(unix)]
fn restrict(options: &mut tokio::fs::OpenOptions) {
    options.mode(0o600);
}

#[cfg(not(unix))]
fn restrict(_options: &mut tokio::fs::OpenOptions) {}
