//! Integration tests for ID-token validation against a published key set

use crate::harness::TestSession;
use auth_session::{IdTokenValidator, JwksCache, Role, TokenError, UserProfileStore, ValidationError};
use auth_test_utils::{IdTokenBuilder, TEST_CLIENT_ID, TEST_ISSUER};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;

fn validator(t: &TestSession) -> IdTokenValidator {
    let jwks = Arc::new(JwksCache::from_config(&t.config, t.store.clone()));
    IdTokenValidator::from_config(&t.config, jwks)
}

#[tokio::test]
async fn test_valid_token_yields_role_set() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    let token = IdTokenBuilder::new()
        .roles(&["student", "library-member", "student"])
        .sign(&t.key);

    let identity = validator(&t).validate(&token).await?;

    let expected: BTreeSet<String> = ["student", "library-member"]
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(identity.roles, expected);
    Ok(())
}

#[tokio::test]
async fn test_single_string_role_claim() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    let token = IdTokenBuilder::new()
        .claim("eduPersonAffiliation", serde_json::json!("staff"))
        .sign(&t.key);

    let identity = validator(&t).validate(&token).await?;

    assert!(identity.has_role("staff"));
    assert_eq!(identity.roles.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_expiry_boundary() -> Result<(), anyhow::Error> {
    // Arrange
    let t = TestSession::start().await;
    let validator = validator(&t);
    let now = Utc::now().timestamp();
    let expired = IdTokenBuilder::new()
        .issued_at(now - 60)
        .expires_at(now - 1)
        .sign(&t.key);
    let valid = IdTokenBuilder::new()
        .issued_at(now - 60)
        .expires_at(now + 1)
        .sign(&t.key);

    // Act & Assert
    assert_eq!(
        validator.validate_at(&expired, now).await.unwrap_err(),
        ValidationError::Token(TokenError::Expired)
    );
    validator.validate_at(&valid, now).await?;
    Ok(())
}

#[tokio::test]
async fn test_issued_at_skew_boundary() -> Result<(), anyhow::Error> {
    let t = TestSession::start().await;
    let validator = validator(&t);
    let now = Utc::now().timestamp();

    let at_limit = IdTokenBuilder::new().issued_at(now + 60).sign(&t.key);
    let beyond = IdTokenBuilder::new().issued_at(now + 61).sign(&t.key);

    validator.validate_at(&at_limit, now).await?;
    assert_eq!(
        validator.validate_at(&beyond, now).await.unwrap_err(),
        ValidationError::Token(TokenError::IssuedInFuture)
    );
    Ok(())
}

#[tokio::test]
async fn test_wrong_issuer() {
    let t = TestSession::start().await;
    let token = IdTokenBuilder::new()
        .issuer("https://evil.example")
        .sign(&t.key);

    assert_eq!(
        validator(&t).validate(&token).await.unwrap_err(),
        ValidationError::Token(TokenError::IssuerMismatch)
    );
}

#[tokio::test]
async fn test_missing_subject() {
    let t = TestSession::start().await;
    let token = IdTokenBuilder::new().without("sub").sign(&t.key);

    assert_eq!(
        validator(&t).validate(&token).await.unwrap_err(),
        ValidationError::Token(TokenError::MissingClaim("sub".to_string()))
    );
}

#[tokio::test]
async fn test_student_classification_example() -> Result<(), anyhow::Error> {
    // Arrange: issuer https://idp.example, aud client123, roles ["student"]
    let t = TestSession::start().await;
    let token = IdTokenBuilder::new()
        .issuer(TEST_ISSUER)
        .audience(serde_json::json!(TEST_CLIENT_ID))
        .roles(&["student"])
        .sign(&t.key);
    let profiles = UserProfileStore::from_config(&t.config, t.store.clone());

    // Act
    let identity = validator(&t).validate(&token).await?;

    // Assert
    assert_eq!(profiles.classify(&identity), Role::Student);
    Ok(())
}
