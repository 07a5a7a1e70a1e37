//! Integration tests for logout and revocation

use crate::harness::TestSession;
use auth_session::SessionState;
use auth_test_utils::REVOKE_PATH;

#[tokio::test]
async fn test_logout_revokes_both_tokens() -> Result<(), anyhow::Error> {
    // Arrange
    let t = TestSession::start().await;
    t.serve_login(&["staff"]).await;
    t.idp.serve_revoke().await;
    t.session.login().await?;

    // Act
    t.session.logout().await?;

    // Assert
    assert_eq!(t.idp.requests_to(REVOKE_PATH).await, 2);
    assert_eq!(t.session.state(), SessionState::Unauthenticated);
    assert!(!t.session.is_authenticated().await);
    assert!(t.session.get_user_info().await.is_none());
    assert!(t.session.get_authorization_header().await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_logout_twice_never_errors() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.idp.serve_revoke().await;
    t.session.login().await?;

    t.session.logout().await?;
    assert_eq!(t.session.state(), SessionState::Unauthenticated);
    t.session.logout().await?;
    assert_eq!(t.session.state(), SessionState::Unauthenticated);

    // Nothing left to revoke the second time
    assert_eq!(t.idp.requests_to(REVOKE_PATH).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_logout_without_session() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;

    t.session.logout().await?;

    assert_eq!(t.idp.requests_to(REVOKE_PATH).await, 0);
    assert_eq!(t.session.state(), SessionState::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_revocation_endpoint_still_clears() -> Result<(), anyhow::Error> {
    // Arrange: no revocation endpoint mounted, wiremock answers 404
    let t = TestSession::start().await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;

    // Act
    t.session.logout().await?;

    // Assert
    assert_eq!(t.session.state(), SessionState::Unauthenticated);
    assert!(t.session.get_authorization_header().await.is_none());
    assert!(t.session.get_user_info().await.is_none());
    Ok(())
}
