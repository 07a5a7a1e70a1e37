//! Session core configuration.
//!
//! Configuration is loaded from environment variables. Nothing in here is
//! secret (public OIDC client, no client secret), so `Debug` is derived.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default JWKS freshness window (24 hours).
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default timeout for every outbound HTTP call.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default claim carrying the user's roles.
pub const DEFAULT_ROLE_CLAIM: &str = "eduPersonAffiliation";

/// Default loopback redirect for the system-browser flow.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";

/// Default scopes requested at login.
pub const DEFAULT_SCOPES: &str = "openid profile email offline_access";

/// Default directory for the CLI's file-backed stores.
pub const DEFAULT_STORAGE_DIR: &str = ".auth-session";

/// Session core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Provider issuer; must equal the `iss` claim exactly.
    pub issuer: String,

    /// OAuth client id; must equal the `aud` claim exactly.
    pub client_id: String,

    /// Redirect URI registered for the public client.
    pub redirect_uri: String,

    /// Space-separated scopes requested at login.
    pub scopes: String,

    /// Published key set location.
    pub jwks_url: String,

    pub authorization_endpoint: String,

    pub token_endpoint: String,

    pub revocation_endpoint: String,

    /// Name of the claim holding the user's roles.
    pub role_claim: String,

    /// Role names that classify a user as a student.
    pub student_roles: BTreeSet<String>,

    /// Role names that classify a user as staff (wins over student).
    pub staff_roles: BTreeSet<String>,

    /// Tolerance for `iat` in the future.
    pub clock_skew: Duration,

    /// How long a fetched key set counts as fresh.
    pub jwks_cache_ttl: Duration,

    /// Timeout applied to JWKS, token and revocation calls.
    pub http_timeout: Duration,

    /// Directory for file-backed stores (CLI).
    pub storage_dir: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),
}

impl SessionConfig {
    /// Build a configuration with defaults derived from the issuer.
    #[must_use]
    pub fn new(issuer: &str, client_id: &str) -> Self {
        let issuer = issuer.trim_end_matches('/').to_string();
        Self {
            jwks_url: format!("{issuer}/.well-known/jwks.json"),
            authorization_endpoint: format!("{issuer}/authorize"),
            token_endpoint: format!("{issuer}/token"),
            revocation_endpoint: format!("{issuer}/revoke"),
            issuer,
            client_id: client_id.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
            role_claim: DEFAULT_ROLE_CLAIM.to_string(),
            student_roles: parse_role_list("student"),
            staff_roles: parse_role_list("staff,faculty,employee"),
            clock_skew: DEFAULT_CLOCK_SKEW,
            jwks_cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer = vars
            .get("OIDC_ISSUER")
            .ok_or_else(|| ConfigError::MissingEnvVar("OIDC_ISSUER".to_string()))?;

        if !(issuer.starts_with("https://") || issuer.starts_with("http://")) {
            return Err(ConfigError::InvalidIssuer(format!(
                "OIDC_ISSUER must be an http(s) URL, got '{issuer}'"
            )));
        }

        let client_id = vars
            .get("OIDC_CLIENT_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("OIDC_CLIENT_ID".to_string()))?;

        let mut config = Self::new(issuer, client_id);

        if let Some(value) = vars.get("OIDC_REDIRECT_URI") {
            config.redirect_uri = value.clone();
        }
        if let Some(value) = vars.get("OIDC_SCOPES") {
            config.scopes = value.clone();
        }
        if let Some(value) = vars.get("OIDC_JWKS_URL") {
            config.jwks_url = value.clone();
        }
        if let Some(value) = vars.get("OIDC_AUTHORIZATION_ENDPOINT") {
            config.authorization_endpoint = value.clone();
        }
        if let Some(value) = vars.get("OIDC_TOKEN_ENDPOINT") {
            config.token_endpoint = value.clone();
        }
        if let Some(value) = vars.get("OIDC_REVOCATION_ENDPOINT") {
            config.revocation_endpoint = value.clone();
        }
        if let Some(value) = vars.get("OIDC_ROLE_CLAIM") {
            config.role_claim = value.clone();
        }
        if let Some(value) = vars.get("STUDENT_ROLES") {
            config.student_roles = parse_role_list(value);
        }
        if let Some(value) = vars.get("STAFF_ROLES") {
            config.staff_roles = parse_role_list(value);
        }
        if let Some(value) = vars.get("AUTH_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(value);
        }

        // Parse JWT clock skew tolerance with validation
        if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidJwtClockSkew(
                    "JWT_CLOCK_SKEW_SECONDS must be positive".to_string(),
                ));
            }

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {value}",
                    MAX_CLOCK_SKEW.as_secs()
                )));
            }

            config.clock_skew = Duration::from_secs(value);
        }

        if let Some(ttl) = parse_positive_secs(vars, "JWKS_CACHE_TTL_SECONDS")? {
            config.jwks_cache_ttl = ttl;
        }
        if let Some(timeout) = parse_positive_secs(vars, "HTTP_TIMEOUT_SECONDS")? {
            config.http_timeout = timeout;
        }

        Ok(config)
    }
}

fn parse_positive_secs(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(None);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(Some(Duration::from_secs(value)))
}

/// Parse a comma-separated role list, dropping blanks.
#[must_use]
pub fn parse_role_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(ToString::to_string)
        .collect()
}
