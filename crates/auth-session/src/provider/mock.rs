//! Mock identity provider for testing.
//!
//! Counts calls per operation, answers from scripted queues and can delay
//! responses so concurrent callers overlap.

use super::{IdentityProvider, TokenResponse, TokenTypeHint};
use crate::errors::ProviderError;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Scripted = Mutex<VecDeque<Result<TokenResponse, ProviderError>>>;

/// Scripted [`IdentityProvider`].
///
/// `authorize` and `refresh` pop the next scripted result; an exhausted queue
/// answers `ProviderError::Network`. `revoke` succeeds unless configured to
/// fail and records every revoked token.
#[derive(Default)]
pub struct MockIdentityProvider {
    authorize_results: Scripted,
    refresh_results: Scripted,
    revoke_error: Mutex<Option<ProviderError>>,
    revoked: Mutex<Vec<(String, TokenTypeHint)>>,
    delay: Mutex<Option<Duration>>,
    authorize_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `authorize` call.
    #[must_use]
    pub fn with_authorize(self, result: Result<TokenResponse, ProviderError>) -> Self {
        self.push_authorize(result);
        self
    }

    /// Queue the result of the next `refresh` call.
    #[must_use]
    pub fn with_refresh(self, result: Result<TokenResponse, ProviderError>) -> Self {
        self.push_refresh(result);
        self
    }

    /// Make every `revoke` call fail with `error`.
    #[must_use]
    pub fn with_revoke_error(self, error: ProviderError) -> Self {
        if let Ok(mut slot) = self.revoke_error.lock() {
            *slot = Some(error);
        }
        self
    }

    /// Sleep this long before answering `authorize` and `refresh`.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        if let Ok(mut slot) = self.delay.lock() {
            *slot = Some(delay);
        }
        self
    }

    pub fn push_authorize(&self, result: Result<TokenResponse, ProviderError>) {
        if let Ok(mut queue) = self.authorize_results.lock() {
            queue.push_back(result);
        }
    }

    pub fn push_refresh(&self, result: Result<TokenResponse, ProviderError>) {
        if let Ok(mut queue) = self.refresh_results.lock() {
            queue.push_back(result);
        }
    }

    pub fn authorize_calls(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    /// Tokens passed to `revoke`, in call order.
    pub fn revoked(&self) -> Vec<(String, TokenTypeHint)> {
        self.revoked.lock().map(|r| r.clone()).unwrap_or_default()
    }

    async fn next(&self, queue: &Scripted) -> Result<TokenResponse, ProviderError> {
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        queue
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err(ProviderError::Network("mock provider has no scripted response".to_string())))
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn authorize(&self) -> Result<TokenResponse, ProviderError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        self.next(&self.authorize_results).await
    }

    async fn refresh(&self, _refresh_token: &SecretString) -> Result<TokenResponse, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.next(&self.refresh_results).await
    }

    async fn revoke(&self, token: &SecretString, hint: TokenTypeHint) -> Result<(), ProviderError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut revoked) = self.revoked.lock() {
            revoked.push((token.expose_secret().to_string(), hint));
        }
        match self.revoke_error.lock().ok().and_then(|e| e.clone()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
