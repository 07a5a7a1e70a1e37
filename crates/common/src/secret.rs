//! Secret types for protecting credentials from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for access, refresh and ID tokens,
//! PKCE verifiers and anything else that must never reach a log line.
//!
//! `SecretString` implements `Debug` with redaction, so any struct deriving
//! `Debug` over a secret field is safe to pass to `tracing`. Values are
//! zeroized on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Credentials {
//!     client_id: String,
//!     refresh_token: SecretString,
//! }
//!
//! let creds = Credentials {
//!     client_id: "booking-app".to_string(),
//!     refresh_token: SecretString::from("rt-123"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("rt-123"));
//! assert_eq!(creds.refresh_token.expose_secret(), "rt-123");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Compare two secrets without exposing them outside this function.
#[must_use]
pub fn secrets_equal(a: &SecretString, b: &SecretString) -> bool {
    a.expose_secret() == b.expose_secret()
}
