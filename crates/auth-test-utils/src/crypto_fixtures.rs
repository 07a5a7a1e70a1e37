//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 signing keys, their JWK form, and a signer
//! producing real compact ID tokens. All fixtures are deterministic based on
//! seed values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};

/// Ed25519 signing key with a key id, as an identity provider would hold it.
///
/// # Example
/// ```rust,ignore
/// let key = TestKeypair::new(1, "idp-key-1");
/// let token = key.sign(&IdTokenBuilder::new().build());
/// let jwks = jwks_json(&[&key]);
/// ```
#[derive(Clone)]
pub struct TestKeypair {
    pub kid: String,
    pub public_key_bytes: Vec<u8>,
    pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// The same seed always produces the same keypair.
    pub fn new(seed: u8, kid: &str) -> Self {
        let seed_bytes = seed_bytes(seed);
        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to generate test keypair");

        Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    /// Public key as base64url, the JWK `x` value.
    pub fn public_key_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.public_key_bytes)
    }

    /// The key as a JWKS entry.
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": self.public_key_b64(),
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    /// Sign `claims` as a compact EdDSA JWT with this key's `kid`.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign with a caller-supplied header, e.g. a missing or foreign `kid`.
    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.pkcs8);
        jsonwebtoken::encode(header, claims, &encoding_key).expect("Failed to sign test token")
    }
}

/// `{"keys": [...]}` body for a JWKS endpoint.
pub fn jwks_json(keys: &[&TestKeypair]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

/// Deterministic 32-byte Ed25519 seed.
pub fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// Ring does not expose PKCS#8 for a seeded keypair, so it is built by hand.
/// Test-only: production keys come from `ring::rand::SystemRandom`.
pub fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // SEQUENCE { version INTEGER 0, AlgorithmIdentifier { OID 1.3.101.112 },
    //            privateKey OCTET STRING { OCTET STRING seed } }
    let mut pkcs8 = Vec::with_capacity(48);
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);
    pkcs8
}
