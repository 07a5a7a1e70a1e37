//! JWT primitives shared by the session crates.
//!
//! This module provides the untrusted, structural half of ID-token handling:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - Compact-serialization decode (header, payload, signing input)
//! - iat validation logic
//! - JWK key-material decoding
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing returned by [`decode_compact`] is trusted: the caller MUST verify
//!   the signature over [`DecodedJwt::signing_input`] before reading claims
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_compact, validate_iat_at, DEFAULT_CLOCK_SKEW};
//!
//! let decoded = decode_compact(token)?;
//! let key = jwks.get_key(decoded.header.kid.as_deref().unwrap_or_default()).await?;
//! // ... verify decoded.signature over decoded.signing_input ...
//! validate_iat_at(iat, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Identity tokens carrying a handful of directory attributes are typically
/// 800-1500 bytes. Anything past 8KB is rejected BEFORE base64 decoding or any
/// cryptographic work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default clock skew tolerance for the `iat` claim (60 seconds).
///
/// Tokens with `iat` more than this amount in the future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Maximum allowed clock skew tolerance (10 minutes).
///
/// Upper bound for configuration so a typo cannot disable the check.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced by the structural JWT helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("Token exceeds the maximum allowed size")]
    TokenTooLarge,

    /// Token is not three base64url segments with JSON header and payload.
    #[error("Token is not a well-formed compact JWT")]
    MalformedToken,

    /// Token `iat` claim is too far in the future.
    #[error("Token issued-at time is too far in the future")]
    IatTooFarInFuture,
}

// =============================================================================
// Decoded Token
// =============================================================================

/// JOSE header fields relevant to key selection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct JwtHeader {
    /// Signing algorithm name as it appears in the token.
    pub alg: String,

    /// Key ID selecting the JWKS entry.
    #[serde(default)]
    pub kid: Option<String>,

    /// Token type (usually "JWT").
    #[serde(default)]
    pub typ: Option<String>,
}

impl JwtHeader {
    /// Returns the `kid` when present and non-empty.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.kid.as_deref().filter(|kid| !kid.is_empty())
    }
}

/// Structurally decoded compact JWT.
///
/// Produced without any signature check. `payload` is attacker-controlled
/// until the signature over `signing_input` has been verified.
#[derive(Debug, Clone)]
pub struct DecodedJwt {
    /// Parsed JOSE header.
    pub header: JwtHeader,

    /// Parsed payload object.
    pub payload: serde_json::Map<String, serde_json::Value>,

    /// `base64url(header) + "." + base64url(payload)`, the signed bytes.
    pub signing_input: String,

    /// The base64url signature segment.
    pub signature: String,
}

// =============================================================================
// Functions
// =============================================================================

/// Decode a compact JWT into header, payload and signature segments.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Not exactly three segments, a segment is not
///   base64url, or header/payload are not JSON objects
pub fn decode_compact(token: &str) -> Result<DecodedJwt, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(payload_part), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    if signature.is_empty() || URL_SAFE_NO_PAD.decode(signature).is_err() {
        tracing::debug!(target: "common.jwt", "Token rejected: signature is not base64url");
        return Err(JwtValidationError::MalformedToken);
    }

    let header_bytes = decode_segment(header_part, "header")?;
    let header: JwtHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let payload_bytes = decode_segment(payload_part, "payload")?;
    let payload: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(&payload_bytes).map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT payload JSON");
            JwtValidationError::MalformedToken
        })?;

    Ok(DecodedJwt {
        header,
        payload,
        signing_input: format!("{header_part}.{payload_part}"),
        signature: signature.to_string(),
    })
}

fn decode_segment(segment: &str, name: &'static str) -> Result<Vec<u8>, JwtValidationError> {
    URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", segment = name, error = %e, "Failed to decode JWT segment");
        JwtValidationError::MalformedToken
    })
}

/// `iat` validation against an explicit `now` timestamp.
///
/// `iat == now + clock_skew` is the last accepted value.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat` is more than
/// `clock_skew` in the future.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds) by configuration
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Decode an Ed25519 public key from JWK `x` field (base64url format).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the base64url content cannot be decoded.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================
