//! Error types for the authentication session core.
//!
//! Lower layers (storage, vault, JWKS cache, validator, identity provider)
//! return their own typed errors. [`SessionError`] is the only type surfaced
//! by `SessionManager`, which is also the only place that decides cleanup.
//!
//! Every error is `Clone` so a single in-flight refresh result can be handed
//! to all concurrent waiters.

use thiserror::Error;

/// Failure of a storage collaborator (secure store or general store).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The store refused access (e.g. OS keystore locked).
    #[error("Storage access denied: {0}")]
    AccessDenied(String),

    /// Underlying I/O failed.
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// A persisted value could not be encoded or decoded.
    #[error("Storage serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            StorageError::AccessDenied(err.to_string())
        } else {
            StorageError::Io(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Failure to resolve a signing key from the JWKS cache.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The key id is not part of the provider's key set.
    #[error("Signing key is not published by the identity provider")]
    UnknownSigningKey,

    /// The key set could not be fetched and nothing is cached.
    #[error("No signing keys available")]
    NoKeysAvailable,
}

/// Identity-token rejection reasons, in validation order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Identity token is malformed")]
    MalformedToken,

    #[error("Identity token is signed with an unknown key")]
    UnknownSigningKey,

    #[error("Identity token signature is invalid")]
    SignatureInvalid,

    #[error("Identity token issuer does not match")]
    IssuerMismatch,

    #[error("Identity token audience does not match")]
    AudienceMismatch,

    #[error("Identity token has expired")]
    Expired,

    #[error("Identity token was issued in the future")]
    IssuedInFuture,

    #[error("Identity token is missing required claim: {0}")]
    MissingClaim(String),
}

/// Outcome of a failed `IdTokenValidator::validate`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("No signing keys available")]
    NoKeysAvailable,
}

impl From<KeyError> for ValidationError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::UnknownSigningKey => ValidationError::Token(TokenError::UnknownSigningKey),
            KeyError::NoKeysAvailable => ValidationError::NoKeysAvailable,
        }
    }
}

/// Failure reported by the Identity Provider collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The user dismissed the browser flow.
    #[error("Login cancelled by the user")]
    UserCancelled,

    /// Transport failure, timeout or provider-side 5xx. Retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider refused the grant (400/401) or the callback was invalid.
    #[error("Identity provider rejected the request: {0}")]
    Rejected(String),

    /// The provider answered with a body that could not be understood.
    #[error("Invalid response from identity provider: {0}")]
    InvalidResponse(String),
}

/// Error surfaced by `SessionManager` to the rest of the application.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Login cancelled by the user")]
    UserCancelled,

    /// Transient failure; the caller may retry.
    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("No signing keys available")]
    NoKeysAvailable,

    /// There is no stored session (or refresh token) to operate on.
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Identity provider rejected the request: {0}")]
    Rejected(String),

    /// A session task ended without producing a result.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Network(_))
    }
}

impl From<ValidationError> for SessionError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Token(token) => SessionError::Token(token),
            ValidationError::NoKeysAvailable => SessionError::NoKeysAvailable,
        }
    }
}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UserCancelled => SessionError::UserCancelled,
            ProviderError::Network(msg) => SessionError::Network(msg),
            ProviderError::Rejected(msg) => SessionError::Rejected(msg),
            // A garbled token-endpoint answer carries no usable identity token.
            ProviderError::InvalidResponse(_) => SessionError::Token(TokenError::MalformedToken),
        }
    }
}
