//! Identity Provider collaborator.
//!
//! [`IdentityProvider`] is the seam between the session manager and the
//! OIDC provider: the Authorization-Code + PKCE login, the refresh-token
//! grant and token revocation. [`HttpIdentityProvider`] talks to a real
//! provider; [`mock::MockIdentityProvider`] is the test double.

pub mod console;
pub mod http;
pub mod mock;
pub mod pkce;

use crate::errors::ProviderError;
use crate::vault::TokenSet;
use async_trait::async_trait;
use common::secret::SecretString;
use std::fmt;

pub use console::ConsoleAuthorizationAgent;
pub use http::HttpIdentityProvider;

/// Tokens issued by the provider's token endpoint.
#[derive(Clone)]
pub struct TokenResponse {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub id_token: SecretString,
    /// Access token lifetime in seconds.
    pub expires_in: Option<u64>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("id_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl TokenResponse {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        id_token: impl Into<String>,
    ) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: refresh_token.map(SecretString::from),
            id_token: SecretString::from(id_token.into()),
            expires_in: None,
        }
    }

    /// Build the token set to store, keeping `previous_refresh_token` when
    /// the provider did not rotate it.
    pub fn into_token_set(self, previous_refresh_token: Option<SecretString>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh_token),
            id_token: self.id_token,
        }
    }
}

/// Which kind of token is being revoked (RFC 7009 `token_type_hint`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenTypeHint::AccessToken => "access_token",
            TokenTypeHint::RefreshToken => "refresh_token",
        }
    }
}

/// OIDC provider operations used by the session manager.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Run the interactive Authorization-Code + PKCE flow.
    ///
    /// # Errors
    ///
    /// `ProviderError::UserCancelled` if the user dismissed the browser,
    /// otherwise the transport or grant failure.
    async fn authorize(&self) -> Result<TokenResponse, ProviderError>;

    /// Exchange a refresh token for new tokens.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenResponse, ProviderError>;

    /// Revoke a token at the provider.
    async fn revoke(&self, token: &SecretString, hint: TokenTypeHint) -> Result<(), ProviderError>;
}

/// Result of the browser leg of the login: the redirect's query parameters.
#[derive(Clone)]
pub struct AuthorizationCallback {
    pub code: SecretString,
    pub state: Option<String>,
}

impl fmt::Debug for AuthorizationCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationCallback")
            .field("code", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

impl AuthorizationCallback {
    /// Parse the redirect URL the browser landed on.
    ///
    /// An `error=access_denied` redirect means the user declined.
    ///
    /// # Errors
    ///
    /// - `ProviderError::UserCancelled` for `access_denied`
    /// - `ProviderError::Rejected` for any other provider error, or a
    ///   redirect without a `code`
    pub fn from_redirect_url(redirect: &str) -> Result<Self, ProviderError> {
        let url = reqwest::Url::parse(redirect)
            .map_err(|e| ProviderError::Rejected(format!("invalid redirect URL: {e}")))?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            if error == "access_denied" {
                return Err(ProviderError::UserCancelled);
            }
            return Err(ProviderError::Rejected(error));
        }

        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::Rejected("redirect carries no authorization code".to_string()))?;

        Ok(Self {
            code: SecretString::from(code),
            state,
        })
    }
}

/// The browser leg of the login.
///
/// Opens `authorization_url` for the user and returns the redirect's
/// parameters once the provider sends the browser back.
#[async_trait]
pub trait AuthorizationAgent: Send + Sync {
    /// # Errors
    ///
    /// `ProviderError::UserCancelled` if the user dismissed the flow.
    async fn authorize(&self, authorization_url: &str) -> Result<AuthorizationCallback, ProviderError>;
}
