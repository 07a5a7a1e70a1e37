//! Integration tests for the refresh-token grant

use crate::harness::TestSession;
use auth_session::{SessionError, SessionState};
use auth_test_utils::{token_body, IdTokenBuilder};
use common::secret::ExposeSecret;
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_refresh_exchanges_once() -> Result<(), anyhow::Error> {
    // Arrange
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;
    t.idp
        .serve_token(
            "refresh_token",
            token_body("at-2", Some("rt-2"), &t.id_token(&["student"])),
            Duration::from_millis(200),
        )
        .await;

    // Act
    let other = t.session.clone();
    let (first, second) = tokio::join!(t.session.refresh(), other.refresh());

    // Assert
    let (first, second) = (first?, second?);
    assert_eq!(t.token_requests("refresh_token").await, 1);
    assert_eq!(first, second);
    assert_eq!(first.access_token.expose_secret(), "at-2");
    assert_eq!(t.session.state(), SessionState::Authenticated);

    Ok(())
}

#[tokio::test]
async fn test_sequential_refreshes_each_exchange() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;
    t.idp
        .serve_token(
            "refresh_token",
            token_body("at-2", None, &t.id_token(&["student"])),
            Duration::ZERO,
        )
        .await;

    t.session.refresh().await?;
    let tokens = t.session.refresh().await?;

    assert_eq!(t.token_requests("refresh_token").await, 2);
    // The provider did not rotate the refresh token
    assert_eq!(
        tokens.refresh_token.map(|rt| rt.expose_secret().to_string()),
        Some("rt-1".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_refresh_picks_up_new_roles() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;
    let promoted = IdTokenBuilder::new().roles(&["employee"]).sign(&t.key);
    t.idp
        .serve_token(
            "refresh_token",
            token_body("at-2", Some("rt-2"), &promoted),
            Duration::ZERO,
        )
        .await;

    t.session.refresh().await?;

    let identity = t
        .session
        .get_user_info()
        .await
        .ok_or_else(|| anyhow::anyhow!("identity missing after refresh"))?;
    assert!(identity.has_role("employee"));
    assert!(!identity.has_role("student"));
    Ok(())
}

#[tokio::test]
async fn test_revoked_refresh_token_signs_out() -> Result<(), anyhow::Error> {
    // Arrange
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;
    t.idp
        .fail_token(
            "refresh_token",
            400,
            serde_json::json!({"error": "invalid_grant"}),
        )
        .await;

    // Act
    let result = t.session.refresh().await;

    // Assert
    assert_eq!(
        result.unwrap_err(),
        SessionError::Rejected("invalid_grant".to_string())
    );
    assert_eq!(t.token_requests("refresh_token").await, 1);
    assert_eq!(t.session.state(), SessionState::Unauthenticated);
    assert!(t.session.get_user_info().await.is_none());
    assert!(!t.session.is_authenticated().await);

    Ok(())
}

#[tokio::test]
async fn test_provider_outage_retries_once() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;
    t.idp
        .fail_token("refresh_token", 503, serde_json::json!({}))
        .await;

    let err = t.session.refresh().await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(t.token_requests("refresh_token").await, 2);
    assert_eq!(t.session.state(), SessionState::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn test_refreshed_id_token_is_validated() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;
    let expired = IdTokenBuilder::new().expires_in(-30).sign(&t.key);
    t.idp
        .serve_token(
            "refresh_token",
            token_body("at-2", Some("rt-2"), &expired),
            Duration::ZERO,
        )
        .await;

    assert!(matches!(
        t.session.refresh().await,
        Err(SessionError::Token(_))
    ));
    assert!(t.session.get_authorization_header().await.is_none());
    Ok(())
}
