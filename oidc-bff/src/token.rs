use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// The ID token claims the gateway cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub nonce: Option<String>,
    /// Logged when a session is issued
    #[serde(default)]
    pub sub: Option<String>,
}

/// Decode the payload of a compact JWT without checking its signature.
///
/// The token arrives straight from the IdP's token endpoint over TLS, so only
/// the claims are read here.
pub fn decode_id_token_claims(token: &str) -> Result<IdTokenClaims> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::InvalidRequest("invalid JWT format".to_string()));
    };

    // Some issuers pad anyway
    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| Error::InvalidRequest(format!("invalid payload: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidRequest(format!("invalid JWT claims: {}", e)))
}

#[cfg(test)]
pub(crate) fn unsigned_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_nonce_claim() {
        let token = unsigned_jwt(&json!({"nonce": "n1", "sub": "alice", "exp": 1700000000}));
        let claims = decode_id_token_claims(&token).unwrap();
        assert_eq!(claims.nonce.as_deref(), Some("n1"));
        assert_eq!(claims.sub.as_deref(), Some("alice"));
    }

    #[test]
    fn missing_nonce_is_none() {
        let token = unsigned_jwt(&json!({"sub": "alice"}));
        assert!(decode_id_token_claims(&token).unwrap().nonce.is_none());
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(decode_id_token_claims("not-a-jwt").is_err());
        assert!(decode_id_token_claims("a.b.c.d").is_err());
        assert!(decode_id_token_claims("a.!!!.c").is_err());
    }
}
