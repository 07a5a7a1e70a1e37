//! Session manager.
//!
//! Drives the session state machine and is the only place that decides
//! cleanup after a failure:
//!
//! ```text
//! UNAUTHENTICATED -> AUTHENTICATING -> AUTHENTICATED | UNAUTHENTICATED
//! AUTHENTICATED   -> REFRESHING     -> AUTHENTICATED | UNAUTHENTICATED
//! AUTHENTICATED   -> LOGGING_OUT    -> UNAUTHENTICATED
//! ```
//!
//! # Concurrency
//!
//! - Login, refresh and logout are serialized by an operation lock.
//! - Once a login has its tokens, and for the whole of refresh and logout,
//!   the work runs in a spawned task that owns the operation lock. Dropping
//!   the caller's future does not stop it, so the lock is always released
//!   and stored state is never left half-updated. Only the interactive part
//!   of a login is cancellable.
//! - `refresh()` is single-flight: concurrent callers await one shared
//!   task and receive the same result.
//! - `is_authenticated()` never waits for the operation lock; it only clears
//!   local state when no operation is running, and then only if the stored
//!   token set is still the one it checked.
//! - State changes are published on a `tokio::sync::watch` channel.

use crate::config::SessionConfig;
use crate::errors::{ProviderError, SessionError};
use crate::id_token::IdTokenValidator;
use crate::identity::DecodedIdentity;
use crate::jwks::JwksCache;
use crate::profile::{Role, UserProfileStore};
use crate::provider::{IdentityProvider, TokenResponse, TokenTypeHint};
use crate::storage::{KeyValueStore, SecureStore};
use crate::vault::{AuthorizationHeaderSource, TokenSet, TokenVault};
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
    LoggingOut,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unauthenticated => "UNAUTHENTICATED",
            SessionState::Authenticating => "AUTHENTICATING",
            SessionState::Authenticated => "AUTHENTICATED",
            SessionState::Refreshing => "REFRESHING",
            SessionState::LoggingOut => "LOGGING_OUT",
        };
        f.write_str(name)
    }
}

/// Observer of session state changes.
pub struct SessionStateReceiver(watch::Receiver<SessionState>);

impl SessionStateReceiver {
    /// Latest published state.
    pub fn current(&self) -> SessionState {
        *self.0.borrow()
    }

    /// Wait for the next state change and return it.
    ///
    /// Returns `None` once the session manager is gone.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.0.changed().await.ok()?;
        Some(*self.0.borrow_and_update())
    }
}

impl fmt::Debug for SessionStateReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStateReceiver")
            .field("current", &self.current())
            .finish()
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenSet, SessionError>>>;

struct Inner {
    vault: Arc<TokenVault>,
    validator: Arc<IdTokenValidator>,
    profiles: Arc<UserProfileStore>,
    provider: Arc<dyn IdentityProvider>,
    op_lock: Arc<Mutex<()>>,
    in_flight_refresh: Mutex<Option<SharedRefresh>>,
    state: watch::Sender<SessionState>,
}

/// Resets the state to UNAUTHENTICATED if the interactive part of a login
/// is dropped before it finishes.
struct TransitionGuard<'a> {
    state: &'a watch::Sender<SessionState>,
    armed: bool,
}

impl TransitionGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(SessionState::Unauthenticated);
        }
    }
}

/// Authentication session for one user.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// # Arguments
    ///
    /// * `vault` - owner of the stored token set
    /// * `validator` - ID-token validator with its JWKS cache
    /// * `profiles` - identity snapshot store and role classifier
    /// * `provider` - the OIDC provider
    pub fn new(
        vault: Arc<TokenVault>,
        validator: Arc<IdTokenValidator>,
        profiles: Arc<UserProfileStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            inner: Arc::new(Inner {
                vault,
                validator,
                profiles,
                provider,
                op_lock: Arc::new(Mutex::new(())),
                in_flight_refresh: Mutex::new(None),
                state,
            }),
        }
    }

    /// Wire every component from `config` over the given stores.
    pub fn from_config(
        config: &SessionConfig,
        secure_store: Arc<dyn SecureStore>,
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let jwks = Arc::new(JwksCache::from_config(config, store.clone()));
        Self::new(
            Arc::new(TokenVault::new(secure_store)),
            Arc::new(IdTokenValidator::from_config(config, jwks)),
            Arc::new(UserProfileStore::from_config(config, store)),
            provider,
        )
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> SessionStateReceiver {
        SessionStateReceiver(self.inner.state.subscribe())
    }

    /// Interactive login.
    ///
    /// Runs the provider's Authorization-Code + PKCE flow, validates the ID
    /// token, then stores the tokens and, only after that succeeded, the
    /// identity.
    ///
    /// Dropping the returned future while the user is still in the browser
    /// cancels the login. Once the provider has answered, the login runs to
    /// completion in the background.
    ///
    /// # Errors
    ///
    /// Any failure, including `SessionError::UserCancelled`, leaves no
    /// session behind: local state is cleared and the session is
    /// UNAUTHENTICATED.
    #[instrument(skip_all)]
    pub async fn login(&self) -> Result<DecodedIdentity, SessionError> {
        let op = self.inner.op_lock.clone().lock_owned().await;
        let guard = self.inner.transition(SessionState::Authenticating);

        let authorized = self.inner.provider.authorize().await;
        guard.disarm();

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.finish_login(op, authorized).await })
            .await
            .map_err(task_failed)?
    }

    /// Exchange the stored refresh token for a new token set.
    ///
    /// Single-flight: callers arriving while a refresh runs share its result.
    /// The refresh finishes even if every caller stops waiting.
    ///
    /// # Errors
    ///
    /// `SessionError::NotAuthenticated` without a stored refresh token.
    /// On any failure local state is cleared and the session is
    /// UNAUTHENTICATED.
    pub async fn refresh(&self) -> Result<TokenSet, SessionError> {
        let shared = {
            let mut slot = self.inner.in_flight_refresh.lock().await;
            if let Some(in_flight) = slot.as_ref() {
                debug!(target: "auth.session", "Joining in-flight refresh");
                in_flight.clone()
            } else {
                let inner = self.inner.clone();
                let task = tokio::spawn(async move {
                    let result = inner.run_refresh().await;
                    *inner.in_flight_refresh.lock().await = None;
                    result
                });
                let refresh = async move { task.await.map_err(task_failed)? }
                    .boxed()
                    .shared();
                *slot = Some(refresh.clone());
                refresh
            }
        };
        shared.await
    }

    /// End the session.
    ///
    /// Revocation is best effort; local state is always cleared. Calling it
    /// without a session is fine.
    ///
    /// # Errors
    ///
    /// `SessionError::Storage` if local state could not be cleared. The
    /// session is UNAUTHENTICATED either way.
    #[instrument(skip_all)]
    pub async fn logout(&self) -> Result<(), SessionError> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run_logout().await })
            .await
            .map_err(task_failed)?
    }

    /// Whether a valid session is stored. Purely local, never fails.
    ///
    /// Re-validates the stored ID token against cached keys only. Any
    /// failure counts as "not authenticated" and clears the stale session.
    pub async fn is_authenticated(&self) -> bool {
        let tokens = match self.inner.vault.load().await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => return false,
            Err(e) => {
                warn!(target: "auth.session", error = %e, "Secure store unavailable, treating as signed out");
                return false;
            }
        };

        let result = self
            .inner
            .validator
            .validate_offline(tokens.id_token.expose_secret())
            .await;

        // An operation in progress owns the stored state; leave it alone.
        let Ok(_op) = self.inner.op_lock.try_lock() else {
            return result.is_ok();
        };

        match result {
            Ok(_) => {
                // Session restored from storage after a restart
                self.inner.state.send_if_modified(|state| {
                    let restore = *state == SessionState::Unauthenticated;
                    if restore {
                        *state = SessionState::Authenticated;
                    }
                    restore
                });
                true
            }
            Err(e) => {
                debug!(target: "auth.session", error = %e, "Stored session is no longer valid");
                match self.inner.vault.clear_if_current(&tokens).await {
                    Ok(true) => {
                        if let Err(e) = self.inner.profiles.clear().await {
                            warn!(target: "auth.session", error = %e, "Failed to clear profile");
                        }
                        self.inner.set_state(SessionState::Unauthenticated);
                        info!(target: "auth.session", "Invalid stored session cleared");
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(target: "auth.session", error = %e, "Failed to clear invalid session");
                    }
                }
                false
            }
        }
    }

    /// Identity of the signed-in user, if any.
    pub async fn get_user_info(&self) -> Option<DecodedIdentity> {
        self.inner.profiles.current().await
    }

    /// `Bearer <access token>` for API calls, if signed in.
    pub async fn get_authorization_header(&self) -> Option<SecretString> {
        self.inner.vault.authorization_header().await
    }

    pub fn classify(&self, identity: &DecodedIdentity) -> Role {
        self.inner.profiles.classify(identity)
    }
}

#[async_trait]
impl AuthorizationHeaderSource for SessionManager {
    async fn authorization_header(&self) -> Option<SecretString> {
        self.get_authorization_header().await
    }
}

impl Inner {
    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(target: "auth.session", from = %previous, to = %next, "Session state changed");
        }
    }

    fn transition(&self, next: SessionState) -> TransitionGuard<'_> {
        self.set_state(next);
        TransitionGuard {
            state: &self.state,
            armed: true,
        }
    }

    async fn finish_login(
        self: Arc<Self>,
        _op: OwnedMutexGuard<()>,
        authorized: Result<TokenResponse, ProviderError>,
    ) -> Result<DecodedIdentity, SessionError> {
        let result = match authorized {
            Ok(response) => self.accept(&response.into_token_set(None)).await,
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(identity) => {
                self.set_state(SessionState::Authenticated);
                info!(
                    target: "auth.session",
                    role = %self.profiles.classify(identity),
                    "Login succeeded"
                );
            }
            Err(e) => {
                self.clear_local().await;
                self.set_state(SessionState::Unauthenticated);
                warn!(target: "auth.session", error = %e, "Login failed, local session cleared");
            }
        }
        result
    }

    async fn run_logout(&self) -> Result<(), SessionError> {
        let _op = self.op_lock.lock().await;
        let guard = self.transition(SessionState::LoggingOut);

        match self.vault.load().await {
            Ok(Some(tokens)) => self.revoke_all(&tokens).await,
            Ok(None) => {}
            Err(e) => {
                warn!(target: "auth.session", error = %e, "Cannot read tokens for revocation");
            }
        }

        let vault_result = self.vault.clear().await;
        let profile_result = self.profiles.clear().await;
        self.set_state(SessionState::Unauthenticated);
        guard.disarm();
        info!(target: "auth.session", "Logged out");

        vault_result?;
        profile_result?;
        Ok(())
    }

    /// Validate the ID token, store the tokens, then save the identity.
    async fn accept(&self, tokens: &TokenSet) -> Result<DecodedIdentity, SessionError> {
        let identity = self
            .validator
            .validate(tokens.id_token.expose_secret())
            .await?;
        self.vault.store(tokens).await?;
        self.profiles.save(&identity).await?;
        Ok(identity)
    }

    async fn run_refresh(&self) -> Result<TokenSet, SessionError> {
        let _op = self.op_lock.lock().await;
        let guard = self.transition(SessionState::Refreshing);

        let result = self.exchange_refresh_token().await;
        match &result {
            Ok(_) => {
                self.set_state(SessionState::Authenticated);
                info!(target: "auth.session", "Session refreshed");
            }
            Err(e) => {
                self.clear_local().await;
                self.set_state(SessionState::Unauthenticated);
                warn!(target: "auth.session", error = %e, "Refresh failed, local session cleared");
            }
        }
        guard.disarm();
        result
    }

    async fn exchange_refresh_token(&self) -> Result<TokenSet, SessionError> {
        let stored = self.vault.load().await?.ok_or(SessionError::NotAuthenticated)?;
        let refresh_token = stored
            .refresh_token
            .clone()
            .ok_or(SessionError::NotAuthenticated)?;

        let response = match self.provider.refresh(&refresh_token).await {
            Err(ProviderError::Network(reason)) => {
                warn!(target: "auth.session", reason = %reason, "Refresh hit a network error, retrying once");
                self.provider.refresh(&refresh_token).await?
            }
            other => other?,
        };

        let tokens = response.into_token_set(Some(refresh_token));
        self.accept(&tokens).await?;
        Ok(tokens)
    }

    async fn revoke_all(&self, tokens: &TokenSet) {
        let mut pending = vec![(&tokens.access_token, TokenTypeHint::AccessToken)];
        if let Some(refresh_token) = &tokens.refresh_token {
            pending.push((refresh_token, TokenTypeHint::RefreshToken));
        }
        for (token, hint) in pending {
            if let Err(e) = self.provider.revoke(token, hint).await {
                warn!(target: "auth.session", hint = hint.as_str(), error = %e, "Token revocation failed, continuing logout");
            }
        }
    }

    /// Best-effort wipe of tokens and identity.
    async fn clear_local(&self) {
        if let Err(e) = self.vault.clear().await {
            warn!(target: "auth.session", error = %e, "Failed to clear token vault");
        }
        if let Err(e) = self.profiles.clear().await {
            warn!(target: "auth.session", error = %e, "Failed to clear profile");
        }
    }
}

fn task_failed(e: JoinError) -> SessionError {
    warn!(target: "auth.session", error = %e, "Session task ended without a result");
    SessionError::Internal(e.to_string())
}
