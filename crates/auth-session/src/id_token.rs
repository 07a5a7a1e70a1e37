//! ID token validation.
//!
//! Validates identity tokens using signing keys from the [`JwksCache`] and
//! maps the claims of a valid token to a [`DecodedIdentity`].
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (denial-of-service prevention)
//! - The signature is verified before any claim is trusted, and a failed
//!   verification is always fatal
//! - Symmetric algorithms and `none` are never accepted
//! - Checks run in a fixed order; the first violation is reported

use crate::config::SessionConfig;
use crate::errors::{TokenError, ValidationError};
use crate::identity::DecodedIdentity;
use crate::jwks::{Jwk, JwksCache};
use common::jwt::{
    decode_compact, decode_ed25519_public_key_jwk, validate_iat_at, DecodedJwt,
    DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW,
};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Where signing keys may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeySource {
    /// Cache, refetching when stale or missing.
    Remote,
    /// Cache only, no network.
    CacheOnly,
}

/// Claims every ID token must carry.
struct RequiredClaims {
    iss: String,
    sub: String,
    aud: Value,
    exp: i64,
    iat: i64,
}

impl RequiredClaims {
    /// Checked in order: issuer, subject, audience, expiry, issued-at.
    fn extract(claims: &Map<String, Value>) -> Result<Self, TokenError> {
        let iss = string_claim(claims, "iss")?;
        let sub = string_claim(claims, "sub")?;
        let aud = claims
            .get("aud")
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| TokenError::MissingClaim("aud".to_string()))?;
        let exp = numeric_claim(claims, "exp")?;
        let iat = numeric_claim(claims, "iat")?;
        Ok(Self {
            iss,
            sub,
            aud,
            exp,
            iat,
        })
    }
}

fn string_claim(claims: &Map<String, Value>, name: &str) -> Result<String, TokenError> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TokenError::MissingClaim(name.to_string()))
}

/// Non-numeric values count as missing.
fn numeric_claim(claims: &Map<String, Value>, name: &str) -> Result<i64, TokenError> {
    let value = claims
        .get(name)
        .ok_or_else(|| TokenError::MissingClaim(name.to_string()))?;

    #[allow(clippy::cast_possible_truncation)]
    let seconds = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64));
    seconds.ok_or_else(|| TokenError::MissingClaim(name.to_string()))
}

/// `aud` is a string equal to the client id, or exactly `[client id]`.
fn audience_matches(aud: &Value, client_id: &str) -> bool {
    match aud {
        Value::String(aud) => aud == client_id,
        Value::Array(values) => {
            values.len() == 1 && values.first().and_then(Value::as_str) == Some(client_id)
        }
        _ => false,
    }
}

/// ID token validator backed by the provider's JWKS.
pub struct IdTokenValidator {
    jwks: Arc<JwksCache>,
    issuer: String,
    client_id: String,
    role_claim: String,
    clock_skew: Duration,
}

impl IdTokenValidator {
    /// Validator with the default role claim and clock skew.
    pub fn new(jwks: Arc<JwksCache>, issuer: &str, client_id: &str) -> Self {
        Self {
            jwks,
            issuer: issuer.to_string(),
            client_id: client_id.to_string(),
            role_claim: crate::config::DEFAULT_ROLE_CLAIM.to_string(),
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    pub fn from_config(config: &SessionConfig, jwks: Arc<JwksCache>) -> Self {
        Self::new(jwks, &config.issuer, &config.client_id)
            .with_role_claim(&config.role_claim)
            .with_clock_skew(config.clock_skew)
    }

    #[must_use]
    pub fn with_role_claim(mut self, role_claim: &str) -> Self {
        self.role_claim = role_claim.to_string();
        self
    }

    /// Clock skew tolerance for `iat`, capped at [`MAX_CLOCK_SKEW`].
    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew.min(MAX_CLOCK_SKEW);
        self
    }

    /// Validate an ID token against the current time.
    ///
    /// # Security Checks
    ///
    /// 1. Size and structure (three base64url segments, JSON header/payload)
    /// 2. Key lookup by `kid`, then signature verification
    /// 3. Presence of `iss`, `sub`, `aud`, `exp`, `iat`
    /// 4. `iss` equals the configured issuer
    /// 5. `aud` equals the configured client id
    /// 6. `exp` is strictly in the future
    /// 7. `iat` is at most the clock skew in the future
    ///
    /// # Errors
    ///
    /// `ValidationError::Token` with the first violated check, or
    /// `ValidationError::NoKeysAvailable` when no signing keys can be obtained.
    pub async fn validate(&self, id_token: &str) -> Result<DecodedIdentity, ValidationError> {
        self.validate_at(id_token, chrono::Utc::now().timestamp())
            .await
    }

    /// Validate against an explicit `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    #[instrument(skip_all)]
    pub async fn validate_at(
        &self,
        id_token: &str,
        now: i64,
    ) -> Result<DecodedIdentity, ValidationError> {
        self.run(id_token, now, KeySource::Remote).await
    }

    /// Validate using cached keys only. Never touches the network.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub async fn validate_offline(
        &self,
        id_token: &str,
    ) -> Result<DecodedIdentity, ValidationError> {
        self.validate_offline_at(id_token, chrono::Utc::now().timestamp())
            .await
    }

    /// Offline validation against an explicit `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    #[instrument(skip_all)]
    pub async fn validate_offline_at(
        &self,
        id_token: &str,
        now: i64,
    ) -> Result<DecodedIdentity, ValidationError> {
        self.run(id_token, now, KeySource::CacheOnly).await
    }

    async fn run(
        &self,
        id_token: &str,
        now: i64,
        source: KeySource,
    ) -> Result<DecodedIdentity, ValidationError> {
        let result = self.check(id_token, now, source).await;
        if let Err(e) = &result {
            tracing::debug!(target: "auth.id_token", error = %e, offline = source == KeySource::CacheOnly, "ID token rejected");
        }
        result
    }

    async fn check(
        &self,
        id_token: &str,
        now: i64,
        source: KeySource,
    ) -> Result<DecodedIdentity, ValidationError> {
        // 1. Structure
        let decoded = decode_compact(id_token).map_err(|_| TokenError::MalformedToken)?;

        // 2. Key and signature
        let kid = decoded
            .header
            .key_id()
            .ok_or(TokenError::UnknownSigningKey)?;
        let jwk = match source {
            KeySource::Remote => self.jwks.get_key(kid).await?,
            KeySource::CacheOnly => self.jwks.cached_key(kid).await?,
        };
        verify_signature(&decoded, &jwk)?;

        // 3. Required claims
        let claims = RequiredClaims::extract(&decoded.payload)?;

        // 4. Issuer
        if claims.iss != self.issuer {
            return Err(TokenError::IssuerMismatch.into());
        }

        // 5. Audience
        if !audience_matches(&claims.aud, &self.client_id) {
            return Err(TokenError::AudienceMismatch.into());
        }

        // 6. Expiry
        if claims.exp <= now {
            return Err(TokenError::Expired.into());
        }

        // 7. Issued-at
        validate_iat_at(claims.iat, self.clock_skew, now)
            .map_err(|_| TokenError::IssuedInFuture)?;

        tracing::debug!(target: "auth.id_token", kid = %kid, "ID token validated");
        Ok(DecodedIdentity::from_claims(
            claims.sub,
            &decoded.payload,
            &self.role_claim,
        ))
    }
}

/// Verify the token signature with `jwk`.
///
/// The header `alg` must be supported, must agree with the key type and
/// with the JWK's own `alg` when it declares one.
fn verify_signature(decoded: &DecodedJwt, jwk: &Jwk) -> Result<(), TokenError> {
    let algorithm =
        Algorithm::from_str(&decoded.header.alg).map_err(|_| TokenError::SignatureInvalid)?;

    if let Some(jwk_alg) = &jwk.alg {
        if *jwk_alg != decoded.header.alg {
            tracing::debug!(target: "auth.id_token", token_alg = %decoded.header.alg, key_alg = %jwk_alg, "Algorithm does not match signing key");
            return Err(TokenError::SignatureInvalid);
        }
    }

    let key = decoding_key(jwk, algorithm).ok_or(TokenError::SignatureInvalid)?;

    match jsonwebtoken::crypto::verify(
        &decoded.signature,
        decoded.signing_input.as_bytes(),
        &key,
        algorithm,
    ) {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(TokenError::SignatureInvalid),
    }
}

/// Build a verification key, or `None` if the algorithm is unsupported or
/// the key material does not fit it.
fn decoding_key(jwk: &Jwk, algorithm: Algorithm) -> Option<DecodingKey> {
    match algorithm {
        Algorithm::EdDSA => {
            if jwk.kty != "OKP" || jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                return None;
            }
            let public_key = decode_ed25519_public_key_jwk(jwk.x.as_deref()?).ok()?;
            Some(DecodingKey::from_ed_der(&public_key))
        }
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
            if jwk.kty != "RSA" {
                return None;
            }
            DecodingKey::from_rsa_components(jwk.n.as_deref()?, jwk.e.as_deref()?).ok()
        }
        Algorithm::ES256 | Algorithm::ES384 => {
            let expected_curve = if algorithm == Algorithm::ES256 {
                "P-256"
            } else {
                "P-384"
            };
            if jwk.kty != "EC" || jwk.crv.as_deref().is_some_and(|crv| crv != expected_curve) {
                return None;
            }
            DecodingKey::from_ec_components(jwk.x.as_deref()?, jwk.y.as_deref()?).ok()
        }
        _ => None,
    }
}
