//! Builder patterns for test ID tokens
//!
//! Provides a fluent API for ID-token claims with valid defaults for the
//! fixture issuer and client.

use crate::crypto_fixtures::TestKeypair;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer used by the fixtures.
pub const TEST_ISSUER: &str = "https://idp.example";

/// Client id used by the fixtures.
pub const TEST_CLIENT_ID: &str = "client123";

/// Subject used by the fixtures.
pub const TEST_SUBJECT: &str = "test-subject";

/// Builder for ID-token claims
///
/// Defaults produce a token that passes validation for [`TEST_ISSUER`] and
/// [`TEST_CLIENT_ID`]: issued now, expiring in an hour, role `student`.
///
/// # Example
/// ```rust,ignore
/// let token = IdTokenBuilder::new()
///     .subject("alice")
///     .roles(&["staff"])
///     .expires_in(60)
///     .sign(&key);
/// ```
#[derive(Debug, Clone)]
pub struct IdTokenBuilder {
    claims: Map<String, Value>,
}

impl IdTokenBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        let claims = json!({
            "iss": TEST_ISSUER,
            "aud": TEST_CLIENT_ID,
            "sub": TEST_SUBJECT,
            "iat": now.timestamp(),
            "exp": (now + Duration::seconds(3600)).timestamp(),
            "mail": "ada@uni.example",
            "givenName": "Ada",
            "sn": "Lovelace",
            "displayName": "Ada Lovelace",
            "eduPersonAffiliation": ["student"]
        });
        Self {
            claims: claims.as_object().cloned().unwrap_or_default(),
        }
    }

    pub fn issuer(self, issuer: &str) -> Self {
        self.claim("iss", json!(issuer))
    }

    pub fn audience(self, audience: Value) -> Self {
        self.claim("aud", audience)
    }

    pub fn subject(self, subject: &str) -> Self {
        self.claim("sub", json!(subject))
    }

    /// Set the default role claim (`eduPersonAffiliation`).
    pub fn roles(self, roles: &[&str]) -> Self {
        self.claim("eduPersonAffiliation", json!(roles))
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.expires_at((Utc::now() + Duration::seconds(seconds)).timestamp())
    }

    pub fn expires_at(self, timestamp: i64) -> Self {
        self.claim("exp", json!(timestamp))
    }

    pub fn issued_at(self, timestamp: i64) -> Self {
        self.claim("iat", json!(timestamp))
    }

    /// Set or replace any claim.
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim, including required ones.
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }

    /// Build and sign with `key`.
    pub fn sign(self, key: &TestKeypair) -> String {
        key.sign(&self.build())
    }
}

impl Default for IdTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
