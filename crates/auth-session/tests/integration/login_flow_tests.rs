//! Integration tests for interactive login
//!
//! Covers the full Authorization-Code + PKCE exchange, ID-token validation
//! against the published key set, and cleanup after every kind of failure.

use crate::harness::{BrowserAgent, TestSession};
use auth_session::storage::{MemorySecureStore, MemoryStore};
use auth_session::{Role, SessionError, SessionState, TokenError};
use auth_test_utils::{token_body, IdTokenBuilder, TestKeypair};
use common::secret::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Successful login
// ============================================================================

#[tokio::test]
async fn test_login_stores_tokens_and_identity() -> Result<(), anyhow::Error> {
    // Arrange
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;

    // Act
    let identity = t.session.login().await?;

    // Assert
    assert_eq!(t.session.state(), SessionState::Authenticated);
    assert_eq!(t.session.classify(&identity), Role::Student);
    assert_eq!(identity.display_name, "Ada Lovelace");
    assert_eq!(t.session.get_user_info().await, Some(identity));
    let header = t
        .session
        .get_authorization_header()
        .await
        .ok_or_else(|| anyhow::anyhow!("no authorization header"))?;
    assert_eq!(header.expose_secret(), "Bearer at-1");
    assert!(t.session.is_authenticated().await);
    assert_eq!(t.token_requests("authorization_code").await, 1);

    Ok(())
}

#[tokio::test]
async fn test_staff_role_wins_over_student() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    t.serve_login(&["student", "faculty"]).await;

    let identity = t.session.login().await?;

    assert_eq!(t.session.classify(&identity), Role::Staff);
    Ok(())
}

// ============================================================================
// Failed login leaves no session
// ============================================================================

#[tokio::test]
async fn test_dismissed_browser_leaves_clean_state() {
    // Arrange
    let t = TestSession::with_stores(
        Arc::new(MemorySecureStore::new()),
        Arc::new(MemoryStore::new()),
        BrowserAgent::dismissing(),
    )
    .await;
    t.idp.serve_jwks(&[&t.key]).await;

    // Act
    let result = t.session.login().await;

    // Assert
    assert_eq!(result.unwrap_err(), SessionError::UserCancelled);
    assert_eq!(t.session.state(), SessionState::Unauthenticated);
    assert!(t.session.get_user_info().await.is_none());
    assert!(t.session.get_authorization_header().await.is_none());
    assert_eq!(t.token_requests("authorization_code").await, 0);
}

#[tokio::test]
async fn test_forged_signature_is_rejected() {
    // Arrange: a different key signing under the published kid
    let t = TestSession::start().await;
    let forged = IdTokenBuilder::new().sign(&TestKeypair::new(42, "idp-key-1"));
    t.idp
        .serve_token(
            "authorization_code",
            token_body("at-1", Some("rt-1"), &forged),
            Duration::ZERO,
        )
        .await;

    // Act
    let result = t.session.login().await;

    // Assert
    assert_eq!(
        result.unwrap_err(),
        SessionError::Token(TokenError::SignatureInvalid)
    );
    assert_eq!(t.session.state(), SessionState::Unauthenticated);
    assert!(t.session.get_authorization_header().await.is_none());
}

#[tokio::test]
async fn test_wrong_audience_is_rejected() {
    let t = TestSession::start().await;
    let token = IdTokenBuilder::new()
        .audience(serde_json::json!("another-client"))
        .sign(&t.key);
    t.idp
        .serve_token(
            "authorization_code",
            token_body("at-1", None, &token),
            Duration::ZERO,
        )
        .await;

    assert_eq!(
        t.session.login().await.unwrap_err(),
        SessionError::Token(TokenError::AudienceMismatch)
    );
    assert!(t.session.get_user_info().await.is_none());
}

#[tokio::test]
async fn test_rejected_code_exchange() {
    let t = TestSession::start().await;
    t.idp
        .fail_token(
            "authorization_code",
            400,
            serde_json::json!({"error": "invalid_grant"}),
        )
        .await;

    assert_eq!(
        t.session.login().await.unwrap_err(),
        SessionError::Rejected("invalid_grant".to_string())
    );
    assert_eq!(t.session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_token_endpoint_timeout_is_transient() {
    // Arrange: the token endpoint answers after the configured timeout
    let t = TestSession::start().await;
    t.idp
        .serve_token(
            "authorization_code",
            token_body("at-1", Some("rt-1"), &t.id_token(&["student"])),
            Duration::from_secs(5),
        )
        .await;

    // Act
    let err = t.session.login().await.unwrap_err();

    // Assert
    assert!(err.is_transient(), "timeout should surface as a network error: {err:?}");
    assert!(t.session.get_authorization_header().await.is_none());
}

#[tokio::test]
async fn test_relogin_replaces_previous_identity() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;

    t.idp.reset().await;
    t.idp.serve_jwks(&[&t.key]).await;
    let staff_token = IdTokenBuilder::new()
        .subject("grace")
        .roles(&["staff"])
        .sign(&t.key);
    t.idp
        .serve_token(
            "authorization_code",
            token_body("at-2", Some("rt-2"), &staff_token),
            Duration::ZERO,
        )
        .await;

    let identity = t.session.login().await?;

    assert_eq!(identity.subject_id, "grace");
    assert_eq!(t.session.classify(&identity), Role::Staff);
    assert_eq!(t.session.get_user_info().await, Some(identity));
    Ok(())
}
