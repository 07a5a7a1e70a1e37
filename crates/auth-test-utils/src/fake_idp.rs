//! Wiremock-backed fake identity provider
//!
//! Serves the JWKS, token and revocation endpoints at the paths the session
//! configuration derives from an issuer (`/.well-known/jwks.json`, `/token`,
//! `/revoke`). The issuer is the mock server's base URI.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const JWKS_PATH: &str = "/.well-known/jwks.json";
pub const TOKEN_PATH: &str = "/token";
pub const REVOKE_PATH: &str = "/revoke";

/// Fake OIDC provider for integration tests.
///
/// # Example
/// ```rust,ignore
/// let idp = FakeIdentityProvider::start().await;
/// idp.serve_jwks(&[&key]).await;
/// let config = SessionConfig::new(&idp.issuer(), TEST_CLIENT_ID);
/// ```
pub struct FakeIdentityProvider {
    server: MockServer,
}

impl FakeIdentityProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Issuer URL (the server's base URI, no trailing slash).
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn jwks_url(&self) -> String {
        format!("{}{JWKS_PATH}", self.server.uri())
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Publish `keys` at the JWKS endpoint.
    pub async fn serve_jwks(&self, keys: &[&TestKeypair]) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .mount(&self.server)
            .await;
    }

    /// Make the JWKS endpoint answer `status`.
    pub async fn fail_jwks(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answer every token request for `grant_type` with `body`, after `delay`.
    pub async fn serve_token(&self, grant_type: &str, body: Value, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains(format!("grant_type={grant_type}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Answer token requests for `grant_type` with an error status.
    pub async fn fail_token(&self, grant_type: &str, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains(format!("grant_type={grant_type}")))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Accept every revocation request.
    pub async fn serve_revoke(&self) {
        Mock::given(method("POST"))
            .and(path(REVOKE_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Drop every mounted endpoint.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of requests received at `request_path`.
    pub async fn requests_to(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == request_path)
            .count()
    }
}

/// Token endpoint body carrying `id_token`.
pub fn token_body(access_token: &str, refresh_token: Option<&str>, id_token: &str) -> Value {
    let mut body = serde_json::json!({
        "access_token": access_token,
        "id_token": id_token,
        "token_type": "Bearer",
        "expires_in": 3600
    });
    if let (Some(refresh_token), Some(object)) = (refresh_token, body.as_object_mut()) {
        object.insert("refresh_token".to_string(), Value::String(refresh_token.to_string()));
    }
    body
}
