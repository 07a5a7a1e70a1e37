//! Integration tests for sessions surviving a restart
//!
//! Uses the file-backed stores the CLI runs on.

use crate::harness::{BrowserAgent, TestSession};
use auth_session::storage::{FileSecureStore, FileStore};
use auth_session::{Role, SessionState};
use auth_test_utils::JWKS_PATH;
use common::secret::ExposeSecret;
use std::sync::Arc;

async fn file_backed(dir: &std::path::Path) -> TestSession {
    let t = TestSession::with_stores(
        Arc::new(FileSecureStore::new(dir.join("secure"))),
        Arc::new(FileStore::new(dir.join("data"))),
        BrowserAgent::approving(),
    )
    .await;
    t.idp.serve_jwks(&[&t.key]).await;
    t
}

#[tokio::test]
async fn test_session_restored_after_restart() -> Result<(), anyhow::Error> {
    // Arrange
    let dir = tempfile::tempdir()?;
    let t = file_backed(dir.path()).await;
    t.serve_login(&["staff"]).await;
    t.session.login().await?;

    // Act
    let restarted = t.restart();

    // Assert
    assert_eq!(restarted.state(), SessionState::Unauthenticated);
    assert!(restarted.is_authenticated().await);
    assert_eq!(restarted.state(), SessionState::Authenticated);
    let identity = restarted
        .get_user_info()
        .await
        .ok_or_else(|| anyhow::anyhow!("profile not restored"))?;
    assert_eq!(restarted.classify(&identity), Role::Staff);
    let header = restarted
        .get_authorization_header()
        .await
        .ok_or_else(|| anyhow::anyhow!("tokens not restored"))?;
    assert_eq!(header.expose_secret(), "Bearer at-1");
    // Keys came from the persisted cache
    assert_eq!(t.idp.requests_to(JWKS_PATH).await, 1);

    Ok(())
}

#[tokio::test]
async fn test_logout_removes_persisted_session() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    let t = file_backed(dir.path()).await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;

    t.session.logout().await?;

    let restarted = t.restart();
    assert!(!restarted.is_authenticated().await);
    assert!(restarted.get_user_info().await.is_none());
    assert!(restarted.get_authorization_header().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_refreshed_tokens_persist() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    let t = file_backed(dir.path()).await;
    t.serve_login(&["student"]).await;
    t.session.login().await?;
    t.idp
        .serve_token(
            "refresh_token",
            auth_test_utils::token_body("at-2", Some("rt-2"), &t.id_token(&["student"])),
            std::time::Duration::ZERO,
        )
        .await;

    t.session.refresh().await?;

    let header = t
        .restart()
        .get_authorization_header()
        .await
        .ok_or_else(|| anyhow::anyhow!("tokens missing"))?;
    assert_eq!(header.expose_secret(), "Bearer at-2");
    Ok(())
}
