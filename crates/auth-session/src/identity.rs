//! Decoded identity of the signed-in user.
//!
//! Produced only from an ID token that passed full validation. The subject id
//! and email are redacted in `Debug` output to keep them out of logs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Profile snapshot derived from ID-token claims.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedIdentity {
    /// `sub` claim - redacted in Debug output.
    pub subject_id: String,

    /// Redacted in Debug output.
    pub email: String,

    pub first_name: String,

    pub last_name: String,

    pub display_name: String,

    /// Values of the configured role claim. Empty when the claim is absent.
    pub roles: BTreeSet<String>,
}

impl fmt::Debug for DecodedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedIdentity")
            .field("subject_id", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("display_name", &self.display_name)
            .field("roles", &self.roles)
            .finish()
    }
}

impl DecodedIdentity {
    /// Map validated claims to an identity.
    ///
    /// For each field the first present string claim wins; absent optional
    /// claims become empty strings.
    pub(crate) fn from_claims(subject_id: String, claims: &Map<String, Value>, role_claim: &str) -> Self {
        Self {
            subject_id,
            email: first_string(claims, &["mail", "email"]),
            first_name: first_string(claims, &["givenName", "given_name"]),
            last_name: first_string(claims, &["sn", "family_name"]),
            display_name: first_string(claims, &["displayName", "cn", "name"]),
            roles: role_set(claims.get(role_claim)),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

fn first_string(claims: &Map<String, Value>, names: &[&str]) -> String {
    names
        .iter()
        .find_map(|name| claims.get(*name).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// A single string is a one-element set; non-string array members are ignored.
fn role_set(value: Option<&Value>) -> BTreeSet<String> {
    match value {
        Some(Value::String(role)) => BTreeSet::from([role.clone()]),
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => BTreeSet::new(),
    }
}
