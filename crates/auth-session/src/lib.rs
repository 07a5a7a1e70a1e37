//! Authentication session core
//!
//! Federated sign-in for the equipment-booking client: OpenID Connect
//! Authorization Code with PKCE, local ID-token verification against the
//! provider's key set, secure token persistence, refresh and logout.
//!
//! # Modules
//!
//! - `config` - Session configuration
//! - `errors` - Error types per layer
//! - `vault` - Token vault over the secure store
//! - `jwks` - Time-bounded signing key cache
//! - `id_token` - ID-token validation
//! - `identity` - Identity snapshot decoded from a validated token
//! - `profile` - Identity persistence and role classification
//! - `provider` - Identity provider collaborator (HTTP, console agent, mock)
//! - `session` - Session manager and state machine
//! - `storage` - Secure and general storage backends

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod errors;
pub mod id_token;
pub mod identity;
pub mod jwks;
pub mod profile;
pub mod provider;
pub mod session;
pub mod storage;
pub mod vault;

pub use config::SessionConfig;
pub use errors::{KeyError, ProviderError, SessionError, StorageError, TokenError, ValidationError};
pub use id_token::IdTokenValidator;
pub use identity::DecodedIdentity;
pub use jwks::JwksCache;
pub use profile::{Role, UserProfileStore};
pub use provider::{IdentityProvider, TokenResponse};
pub use session::{SessionManager, SessionState, SessionStateReceiver};
pub use vault::{AuthorizationHeaderSource, TokenSet, TokenVault};
