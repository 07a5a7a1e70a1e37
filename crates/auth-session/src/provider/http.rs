//! HTTP Identity Provider.
//!
//! Authorization-Code + PKCE login, refresh-token grant and RFC 7009
//! revocation against the provider's endpoints. Every request carries the
//! configured timeout.
//!
//! Status handling, shared by all endpoints:
//! - 2xx: success
//! - 400/401: `Rejected` (body logged at trace level only)
//! - anything else, and transport errors or timeouts: `Network`

use super::pkce::PkceMaterial;
use super::{AuthorizationAgent, IdentityProvider, TokenResponse, TokenTypeHint};
use crate::config::SessionConfig;
use crate::errors::ProviderError;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    id_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl From<OAuthTokenResponse> for TokenResponse {
    fn from(raw: OAuthTokenResponse) -> Self {
        Self {
            access_token: SecretString::from(raw.access_token),
            refresh_token: raw.refresh_token.map(SecretString::from),
            id_token: SecretString::from(raw.id_token),
            expires_in: raw.expires_in,
        }
    }
}

/// OAuth error body (`{"error": "invalid_grant", ...}`).
#[derive(Deserialize)]
struct OAuthErrorResponse {
    error: String,
}

/// Identity provider reached over HTTPS.
pub struct HttpIdentityProvider {
    http_client: reqwest::Client,
    agent: Arc<dyn AuthorizationAgent>,
    client_id: String,
    redirect_uri: String,
    scopes: String,
    authorization_endpoint: String,
    token_endpoint: String,
    revocation_endpoint: String,
}

impl HttpIdentityProvider {
    /// # Arguments
    ///
    /// * `config` - endpoints, client id, redirect URI, scopes and timeout
    /// * `agent` - opens the authorization URL and returns the redirect
    pub fn new(config: &SessionConfig, agent: Arc<dyn AuthorizationAgent>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(config.http_timeout))
            .build()
            .unwrap_or_else(|e| {
                warn!(target: "auth.provider", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            http_client,
            agent,
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            authorization_endpoint: config.authorization_endpoint.clone(),
            token_endpoint: config.token_endpoint.clone(),
            revocation_endpoint: config.revocation_endpoint.clone(),
        }
    }

    /// Authorization request URL for one login attempt.
    ///
    /// # Errors
    ///
    /// `ProviderError::Rejected` if the configured endpoint is not a URL.
    pub fn authorization_url(&self, pkce: &PkceMaterial) -> Result<String, ProviderError> {
        let url = reqwest::Url::parse_with_params(
            &self.authorization_endpoint,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", self.scopes.as_str()),
                ("state", pkce.state.as_str()),
                ("code_challenge", pkce.code_challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| ProviderError::Rejected(format!("invalid authorization endpoint: {e}")))?;
        Ok(url.into())
    }

    async fn token_request(
        &self,
        grant: &'static str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, ProviderError> {
        debug!(target: "auth.provider", grant = grant, url = %self.token_endpoint, "Requesting tokens");

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let response = check_status(response).await?;
        let tokens: OAuthTokenResponse = response.json().await.map_err(|e| {
            warn!(target: "auth.provider", error = %e, "Failed to parse token response");
            ProviderError::InvalidResponse(e.to_string())
        })?;

        debug!(
            target: "auth.provider",
            grant = grant,
            has_refresh_token = tokens.refresh_token.is_some(),
            expires_in_secs = tokens.expires_in,
            "Tokens issued"
        );
        Ok(tokens.into())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip_all)]
    async fn authorize(&self) -> Result<TokenResponse, ProviderError> {
        let pkce = PkceMaterial::generate()
            .map_err(|_| ProviderError::Rejected("failed to generate PKCE material".to_string()))?;
        let url = self.authorization_url(&pkce)?;

        let callback = self.agent.authorize(&url).await?;

        if callback.state.as_deref() != Some(pkce.state.as_str()) {
            warn!(target: "auth.provider", "Authorization callback state mismatch");
            return Err(ProviderError::Rejected("state mismatch".to_string()));
        }

        self.token_request(
            "authorization_code",
            &[
                ("grant_type", "authorization_code"),
                ("code", callback.code.expose_secret()),
                ("code_verifier", pkce.code_verifier.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
            ],
        )
        .await
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenResponse, ProviderError> {
        self.token_request(
            "refresh_token",
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
                ("client_id", self.client_id.as_str()),
            ],
        )
        .await
    }

    #[instrument(skip_all, fields(hint = hint.as_str()))]
    async fn revoke(&self, token: &SecretString, hint: TokenTypeHint) -> Result<(), ProviderError> {
        let response = self
            .http_client
            .post(&self.revocation_endpoint)
            .form(&[
                ("token", token.expose_secret()),
                ("token_type_hint", hint.as_str()),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        check_status(response).await?;
        debug!(target: "auth.provider", hint = hint.as_str(), "Token revoked");
        Ok(())
    }
}

fn transport_error(e: &reqwest::Error) -> ProviderError {
    debug!(target: "auth.provider", error = %e, timeout = e.is_timeout(), "HTTP request failed");
    if e.is_timeout() {
        ProviderError::Network("request timed out".to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 400 || status.as_u16() == 401 {
        let body = response.text().await.unwrap_or_else(|e| {
            trace!(target: "auth.provider", error = %e, "Failed to read error response body");
            String::new()
        });
        warn!(target: "auth.provider", status = %status, "Request rejected by identity provider");
        trace!(target: "auth.provider", body = %body, "Rejection response body");

        let reason = serde_json::from_str::<OAuthErrorResponse>(&body)
            .map_or_else(|_| format!("Status {status}"), |e| e.error);
        return Err(ProviderError::Rejected(reason));
    }

    warn!(target: "auth.provider", status = %status, "Identity provider returned an error status");
    Err(ProviderError::Network(format!("Unexpected status: {status}")))
}
