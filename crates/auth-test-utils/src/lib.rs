//! # Auth Test Utilities
//!
//! Shared test utilities for the authentication session core.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (seeded Ed25519 keys, JWKS bodies, signed tokens)
//! - ID-token builders with valid defaults
//! - A wiremock-backed fake identity provider
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestKeypair::new(1, "idp-key-1");
//!     let idp = FakeIdentityProvider::start().await;
//!     idp.serve_jwks(&[&key]).await;
//!
//!     let id_token = IdTokenBuilder::new()
//!         .issuer(&idp.issuer())
//!         .roles(&["staff"])
//!         .sign(&key);
//! }
//! ```

pub mod crypto_fixtures;
pub mod fake_idp;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use fake_idp::*;
pub use token_builders::*;
