//! Token vault: the single owner of the current token set.
//!
//! Backed by a [`SecureStore`] with one entry per token. Every operation runs
//! under one async mutex, so callers never observe a half-written set, and a
//! failed `store` puts the previous entries back before returning the error.
//! The ID-token entry commits a set: it is removed before the other entries
//! change and written last, so a write cut short by cancellation or a crash
//! loads as no session rather than a mix of old and new tokens.

use crate::errors::StorageError;
use crate::storage::SecureStore;
use async_trait::async_trait;
use common::secret::{secrets_equal, ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Secure entry holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Secure entry holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Secure entry holding the ID token.
pub const ID_TOKEN_KEY: &str = "idToken";

/// Credentials issued by the identity provider for one session.
///
/// Replaced wholesale on refresh, never mutated in place. `Debug` output is
/// redacted by `SecretString`.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub id_token: SecretString,
}

impl TokenSet {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        id_token: impl Into<String>,
    ) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: refresh_token.map(SecretString::from),
            id_token: SecretString::from(id_token.into()),
        }
    }

    /// `Bearer <access token>` for an HTTP `Authorization` header.
    #[must_use]
    pub fn bearer_header(&self) -> SecretString {
        SecretString::from(format!("Bearer {}", self.access_token.expose_secret()))
    }
}

impl PartialEq for TokenSet {
    fn eq(&self, other: &Self) -> bool {
        let refresh_equal = match (&self.refresh_token, &other.refresh_token) {
            (Some(a), Some(b)) => secrets_equal(a, b),
            (None, None) => true,
            _ => false,
        };
        refresh_equal
            && secrets_equal(&self.access_token, &other.access_token)
            && secrets_equal(&self.id_token, &other.id_token)
    }
}

impl Eq for TokenSet {}

/// Supplies the current `Authorization` header value to API clients.
///
/// This is the only view of the session the Booking API client gets.
#[async_trait]
pub trait AuthorizationHeaderSource: Send + Sync {
    /// `Some("Bearer ...")` while a session is stored, otherwise `None`.
    async fn authorization_header(&self) -> Option<SecretString>;
}

type StoredEntries = (
    Option<SecretString>,
    Option<SecretString>,
    Option<SecretString>,
);

/// Serialized access to the stored [`TokenSet`].
pub struct TokenVault {
    store: Arc<dyn SecureStore>,
    lock: Mutex<()>,
}

impl TokenVault {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Persist `tokens`, replacing whatever was stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the secure store refuses a read or write. The
    /// previously stored set is restored before the error is returned.
    #[instrument(skip_all)]
    pub async fn store(&self, tokens: &TokenSet) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;

        let previous = self.read_entries().await?;

        if let Err(e) = self.write_entries(tokens).await {
            warn!(target: "auth.vault", error = %e, "Token write failed, restoring previous entries");
            self.restore_entries(previous).await;
            return Err(e);
        }

        debug!(
            target: "auth.vault",
            has_refresh_token = tokens.refresh_token.is_some(),
            "Token set stored"
        );
        Ok(())
    }

    /// Load the stored set, or `None` if no complete set is stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the secure store refuses access.
    pub async fn load(&self) -> Result<Option<TokenSet>, StorageError> {
        let _guard = self.lock.lock().await;
        self.load_unlocked().await
    }

    /// Remove every stored entry. Succeeds when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns the first `StorageError` encountered; every entry is still
    /// attempted.
    #[instrument(skip_all)]
    pub async fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        self.clear_unlocked().await
    }

    /// Clear only if the stored set still equals `expected`.
    ///
    /// Returns whether a clear happened. Used by checks that read the vault
    /// without holding the session operation lock, so a set stored in the
    /// meantime by a concurrent login is left alone.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the secure store refuses access.
    pub async fn clear_if_current(&self, expected: &TokenSet) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().await;
        match self.load_unlocked().await? {
            Some(current) if current == *expected => {
                self.clear_unlocked().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load_unlocked(&self) -> Result<Option<TokenSet>, StorageError> {
        match self.read_entries().await? {
            (Some(access_token), refresh_token, Some(id_token)) => Ok(Some(TokenSet {
                access_token,
                refresh_token,
                id_token,
            })),
            (None, None, None) => Ok(None),
            _ => {
                debug!(target: "auth.vault", "Incomplete token set in secure store, treating as absent");
                Ok(None)
            }
        }
    }

    async fn read_entries(&self) -> Result<StoredEntries, StorageError> {
        let access = self.store.get(ACCESS_TOKEN_KEY).await?;
        let refresh = self.store.get(REFRESH_TOKEN_KEY).await?;
        let id = self.store.get(ID_TOKEN_KEY).await?;
        Ok((access, refresh, id))
    }

    /// The ID token is removed first and written last, so an interrupted
    /// write leaves an incomplete set that loads as absent.
    async fn write_entries(&self, tokens: &TokenSet) -> Result<(), StorageError> {
        self.store.delete(ID_TOKEN_KEY).await?;
        self.store.set(ACCESS_TOKEN_KEY, &tokens.access_token).await?;
        match &tokens.refresh_token {
            Some(refresh) => self.store.set(REFRESH_TOKEN_KEY, refresh).await?,
            None => self.store.delete(REFRESH_TOKEN_KEY).await?,
        }
        self.store.set(ID_TOKEN_KEY, &tokens.id_token).await
    }

    async fn restore_entries(&self, previous: StoredEntries) {
        let (access, refresh, id) = previous;
        if let Err(e) = self.store.delete(ID_TOKEN_KEY).await {
            warn!(target: "auth.vault", entry = ID_TOKEN_KEY, error = %e, "Failed to restore entry");
            return;
        }
        for (key, value) in [
            (ACCESS_TOKEN_KEY, access),
            (REFRESH_TOKEN_KEY, refresh),
            (ID_TOKEN_KEY, id),
        ] {
            let result = match value {
                Some(value) => self.store.set(key, &value).await,
                None => self.store.delete(key).await,
            };
            if let Err(e) = result {
                warn!(target: "auth.vault", entry = key, error = %e, "Failed to restore entry");
            }
        }
    }

    async fn clear_unlocked(&self) -> Result<(), StorageError> {
        let mut first_error = None;
        for key in [ID_TOKEN_KEY, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.store.delete(key).await {
                warn!(target: "auth.vault", entry = key, error = %e, "Failed to delete entry");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(target: "auth.vault", "Token set cleared");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl AuthorizationHeaderSource for TokenVault {
    async fn authorization_header(&self) -> Option<SecretString> {
        match self.load().await {
            Ok(tokens) => tokens.map(|t| t.bearer_header()),
            Err(e) => {
                warn!(target: "auth.vault", error = %e, "Secure store unavailable, no authorization header");
                None
            }
        }
    }
}
