//! PKCE (RFC 7636) and `state` generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};

/// One login attempt's PKCE verifier, challenge and CSRF `state`.
pub struct PkceMaterial {
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
}

impl PkceMaterial {
    /// Fresh random material.
    ///
    /// # Errors
    ///
    /// Returns `ring::error::Unspecified` if the system RNG fails.
    pub fn generate() -> Result<Self, ring::error::Unspecified> {
        let rng = SystemRandom::new();
        let code_verifier = generate_code_verifier(&rng)?;
        let code_challenge = compute_code_challenge(&code_verifier);
        let state = generate_state(&rng)?;
        Ok(Self {
            code_verifier,
            code_challenge,
            state,
        })
    }
}

/// 48 random bytes, base64url: a 64-character verifier.
pub fn generate_code_verifier(rng: &dyn SecureRandom) -> Result<String, ring::error::Unspecified> {
    let mut bytes = [0u8; 48];
    rng.fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// `S256` challenge: `BASE64URL(SHA256(verifier))`.
#[must_use]
pub fn compute_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(digest(&SHA256, verifier.as_bytes()))
}

/// 16 random bytes, base64url: a 22-character state.
pub fn generate_state(rng: &dyn SecureRandom) -> Result<String, ring::error::Unspecified> {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
