//! Random secrets and PKCE helpers shared by every stage of the login flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// The only PKCE method this gateway emits.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

const TOKEN_BYTES: usize = 32;

/// 32 bytes from a CSPRNG, base64url-encoded without padding.
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// PKCE S256 challenge: base64url(SHA-256(verifier)).
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub(crate) fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Fresh values for one authorization request.
#[derive(Debug, Clone)]
pub struct AuthorizationSecrets {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub code_challenge: String,
}

impl AuthorizationSecrets {
    pub fn generate() -> Self {
        let code_verifier = random_token();
        Self {
            state: random_token(),
            nonce: random_token(),
            code_challenge: code_challenge(&code_verifier),
            code_verifier,
        }
    }
}
