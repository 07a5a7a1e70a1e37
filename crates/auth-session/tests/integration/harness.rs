//! Shared setup: a session wired to the fake identity provider.

#![allow(dead_code)]

use async_trait::async_trait;
use auth_session::provider::{AuthorizationAgent, AuthorizationCallback, HttpIdentityProvider};
use auth_session::storage::{KeyValueStore, MemorySecureStore, MemoryStore, SecureStore};
use auth_session::{ProviderError, SessionConfig, SessionManager};
use auth_test_utils::{
    token_body, FakeIdentityProvider, IdTokenBuilder, TestKeypair, TEST_CLIENT_ID, TEST_ISSUER,
};
use common::secret::SecretString;
use std::sync::Arc;
use std::time::Duration;

pub const AUTH_CODE: &str = "auth-code-1";

/// Plays the browser: approves the login and echoes the URL's `state`, or
/// dismisses it.
pub struct BrowserAgent {
    cancel: bool,
}

impl BrowserAgent {
    pub fn approving() -> Self {
        Self { cancel: false }
    }

    pub fn dismissing() -> Self {
        Self { cancel: true }
    }
}

#[async_trait]
impl AuthorizationAgent for BrowserAgent {
    async fn authorize(&self, url: &str) -> Result<AuthorizationCallback, ProviderError> {
        if self.cancel {
            return Err(ProviderError::UserCancelled);
        }
        let url = reqwest::Url::parse(url)
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;
        let state = url
            .query_pairs()
            .find(|(name, _)| name == "state")
            .map(|(_, value)| value.into_owned());
        Ok(AuthorizationCallback {
            code: SecretString::from(AUTH_CODE),
            state,
        })
    }
}

/// Session over in-memory stores, talking HTTP to a fake provider.
///
/// The token issuer stays [`TEST_ISSUER`]; only the endpoints point at the
/// fake provider.
pub struct TestSession {
    pub session: SessionManager,
    pub idp: FakeIdentityProvider,
    pub key: TestKeypair,
    pub config: SessionConfig,
    pub secure_store: Arc<dyn SecureStore>,
    pub store: Arc<dyn KeyValueStore>,
}

impl TestSession {
    /// Provider publishing one signing key.
    pub async fn start() -> Self {
        let session = Self::start_without_jwks().await;
        session.idp.serve_jwks(&[&session.key]).await;
        session
    }

    /// Provider with no JWKS endpoint mounted yet.
    pub async fn start_without_jwks() -> Self {
        Self::with_stores(
            Arc::new(MemorySecureStore::new()),
            Arc::new(MemoryStore::new()),
            BrowserAgent::approving(),
        )
        .await
    }

    pub async fn with_stores(
        secure_store: Arc<dyn SecureStore>,
        store: Arc<dyn KeyValueStore>,
        agent: BrowserAgent,
    ) -> Self {
        let idp = FakeIdentityProvider::start().await;
        let config = config_for(&idp);
        let session = build_session(&config, secure_store.clone(), store.clone(), agent);
        Self {
            session,
            idp,
            key: TestKeypair::new(1, "idp-key-1"),
            config,
            secure_store,
            store,
        }
    }

    /// A second manager over the same stores, as after an app restart.
    pub fn restart(&self) -> SessionManager {
        build_session(
            &self.config,
            self.secure_store.clone(),
            self.store.clone(),
            BrowserAgent::approving(),
        )
    }

    pub fn id_token(&self, roles: &[&str]) -> String {
        IdTokenBuilder::new().roles(roles).sign(&self.key)
    }

    /// Answer the authorization-code grant with a fresh token set.
    pub async fn serve_login(&self, roles: &[&str]) {
        self.idp
            .serve_token(
                "authorization_code",
                token_body("at-1", Some("rt-1"), &self.id_token(roles)),
                Duration::ZERO,
            )
            .await;
    }

    /// Number of token-endpoint requests for `grant_type`.
    pub async fn token_requests(&self, grant_type: &str) -> usize {
        let needle = format!("grant_type={grant_type}");
        self.idp
            .server()
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| String::from_utf8_lossy(&request.body).contains(&needle))
            .count()
    }
}

pub fn config_for(idp: &FakeIdentityProvider) -> SessionConfig {
    let base = idp.issuer();
    let mut config = SessionConfig::new(TEST_ISSUER, TEST_CLIENT_ID);
    config.jwks_url = idp.jwks_url();
    config.authorization_endpoint = format!("{base}/authorize");
    config.token_endpoint = format!("{base}/token");
    config.revocation_endpoint = format!("{base}/revoke");
    config.http_timeout = Duration::from_secs(2);
    config
}

fn build_session(
    config: &SessionConfig,
    secure_store: Arc<dyn SecureStore>,
    store: Arc<dyn KeyValueStore>,
    agent: BrowserAgent,
) -> SessionManager {
    let provider = Arc::new(HttpIdentityProvider::new(config, Arc::new(agent)));
    SessionManager::from_config(config, secure_store, store, provider)
}
