//! Integration tests for signing key caching
//!
//! The cache serves fresh keys without network calls, refetches after the
//! TTL or when an unknown `kid` shows up, and falls back to a stale key set
//! when the provider cannot be reached.

use crate::harness::TestSession;
use auth_session::jwks::JWKS_CACHE_KEY;
use auth_session::storage::{KeyValueStore, MemoryStore};
use auth_session::vault::TokenSet;
use auth_session::{
    IdTokenValidator, JwksCache, KeyError, SessionState, TokenError, TokenVault, ValidationError,
};
use auth_test_utils::{IdTokenBuilder, TestKeypair, JWKS_PATH, TEST_CLIENT_ID, TEST_ISSUER};
use chrono::{Duration, Utc};
use std::sync::Arc;

async fn seed_key_set(store: &dyn KeyValueStore, key: &TestKeypair, age: Duration) {
    store
        .put(
            JWKS_CACHE_KEY,
            serde_json::json!({
                "keys": [key.jwk()],
                "fetchedAt": (Utc::now() - age).to_rfc3339(),
            }),
        )
        .await
        .expect("seed key set");
}

#[tokio::test]
async fn test_stale_key_set_served_when_refetch_fails() -> Result<(), anyhow::Error> {
    // Arrange: key set fetched 25 hours ago, provider JWKS endpoint down
    let t = TestSession::start_without_jwks().await;
    seed_key_set(t.store.as_ref(), &t.key, Duration::hours(25)).await;
    t.idp.fail_jwks(503).await;
    let cache = JwksCache::from_config(&t.config, t.store.clone());

    // Act
    let key = cache.get_key("idp-key-1").await?;

    // Assert
    assert_eq!(key.kid, "idp-key-1");
    assert_eq!(t.idp.requests_to(JWKS_PATH).await, 1, "stale entry must trigger a refetch");
    Ok(())
}

#[tokio::test]
async fn test_login_succeeds_on_stale_keys_during_outage() -> Result<(), anyhow::Error> {
    let t = TestSession::start_without_jwks().await;
    seed_key_set(t.store.as_ref(), &t.key, Duration::hours(25)).await;
    t.idp.fail_jwks(503).await;
    t.serve_login(&["student"]).await;

    t.session.login().await?;

    assert_eq!(t.session.state(), SessionState::Authenticated);
    Ok(())
}

#[tokio::test]
async fn test_stale_key_set_replaced_by_refetch() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    seed_key_set(t.store.as_ref(), &t.key, Duration::hours(25)).await;
    let cache = JwksCache::from_config(&t.config, t.store.clone());

    cache.get_key("idp-key-1").await?;

    let fetched_at = cache
        .fetched_at()
        .await
        .ok_or_else(|| anyhow::anyhow!("nothing cached"))?;
    assert!(Utc::now() - fetched_at < Duration::minutes(1));
    Ok(())
}

#[tokio::test]
async fn test_fresh_key_set_is_not_refetched() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    seed_key_set(t.store.as_ref(), &t.key, Duration::hours(1)).await;
    let cache = JwksCache::from_config(&t.config, t.store.clone());

    cache.get_key("idp-key-1").await?;
    cache.get_key("idp-key-1").await?;

    assert_eq!(t.idp.requests_to(JWKS_PATH).await, 0);
    Ok(())
}

#[tokio::test]
async fn test_no_keys_without_cache_or_provider() {
    let t = TestSession::start_without_jwks().await;
    t.idp.fail_jwks(500).await;
    let cache = JwksCache::from_config(&t.config, Arc::new(MemoryStore::new()));

    assert_eq!(
        cache.get_key("idp-key-1").await.unwrap_err(),
        KeyError::NoKeysAvailable
    );
}

#[tokio::test]
async fn test_unknown_kid_is_rejected() {
    // Arrange
    let t = TestSession::start().await;
    let jwks = Arc::new(JwksCache::from_config(&t.config, t.store.clone()));
    let validator = IdTokenValidator::new(jwks, TEST_ISSUER, TEST_CLIENT_ID);
    let rotated = TestKeypair::new(7, "rotated-key");

    // Act
    let result = validator
        .validate(&IdTokenBuilder::new().sign(&rotated))
        .await;

    // Assert
    assert_eq!(
        result.unwrap_err(),
        ValidationError::Token(TokenError::UnknownSigningKey)
    );
}

#[tokio::test]
async fn test_unknown_kid_makes_session_unauthenticated() -> Result<(), anyhow::Error> {
    // Arrange: signed in, then the stored ID token is swapped for one signed
    // by a key the provider never published
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;
    let rotated = TestKeypair::new(7, "rotated-key");
    let vault = TokenVault::new(t.secure_store.clone());
    vault
        .store(&TokenSet::new(
            "at-1",
            Some("rt-1".to_string()),
            IdTokenBuilder::new().sign(&rotated),
        ))
        .await?;

    // Act
    let authenticated = t.session.is_authenticated().await;

    // Assert
    assert!(!authenticated);
    assert_eq!(t.session.state(), SessionState::Unauthenticated);
    assert!(vault.load().await?.is_none());
    assert!(t.session.get_user_info().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_is_authenticated_makes_no_network_calls() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;
    assert_eq!(t.idp.requests_to(JWKS_PATH).await, 1);

    assert!(t.session.is_authenticated().await);
    assert!(t.session.is_authenticated().await);

    assert_eq!(t.idp.requests_to(JWKS_PATH).await, 1);
    Ok(())
}
