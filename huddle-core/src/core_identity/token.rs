//! Signed, expiring tokens (HS256 JWT)
//!
//! Session, password-reset and invite tokens all use the same envelope:
//! the payload fields plus `iat` and `exp` in seconds. Each token family
//! has its own secret, so a token of one family never verifies as another.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad signature, malformed, expired or wrong payload. Callers never
    /// learn which.
    #[error("Token is invalid or expired")]
    Invalid,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    #[serde(flatten)]
    payload: T,
    iat: u64,
    exp: u64,
}

/// Signs and verifies tokens with a single shared secret
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenSigner {
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        TokenSigner {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation,
        }
    }

    /// Sign `payload`, valid for `ttl` from now
    pub fn sign<T: Serialize>(&self, payload: &T, ttl: Duration) -> Result<String, TokenError> {
        let iat = unix_now();
        let envelope = Envelope { payload, iat, exp: iat.saturating_add(ttl.as_secs()) };
        encode(&Header::new(Algorithm::HS256), &envelope, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and expiry, then decode the payload
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let data = decode::<Envelope<T>>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            TokenError::Invalid
        })?;

        // exp must lie strictly in the future
        if data.claims.exp <= unix_now() {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims.payload)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Subject {
        sub: String,
    }

    fn signer(secret: &str) -> TokenSigner {
        TokenSigner::new(&SecretString::new(secret.to_string()))
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = signer("s3cret");
        let token = signer.sign(&Subject { sub: "alice".into() }, Duration::from_secs(60)).unwrap();
        let subject: Subject = signer.verify(&token).unwrap();
        assert_eq!(subject.sub, "alice");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = signer("one")
            .sign(&Subject { sub: "alice".into() }, Duration::from_secs(60))
            .unwrap();
        let result = signer("two").verify::<Subject>(&token);
        assert!(matches!(result, Err(TokenError::Invalid)));
    }

    #[test]
    fn test_zero_ttl_is_already_expired() {
        let signer = signer("s3cret");
        let token = signer.sign(&Subject { sub: "alice".into() }, Duration::ZERO).unwrap();
        assert!(matches!(signer.verify::<Subject>(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let signer = signer("s3cret");
        let token = signer.sign(&Subject { sub: "alice".into() }, Duration::from_secs(60)).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(matches!(signer.verify::<Subject>(&tampered), Err(TokenError::Invalid)));
        assert!(matches!(signer.verify::<Subject>("garbage"), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_payload_shape_mismatch_rejected() {
        #[derive(Deserialize)]
        struct Other {
            #[allow(dead_code)]
            workspace: String,
        }

        let signer = signer("s3cret");
        let token = signer.sign(&Subject { sub: "alice".into() }, Duration::from_secs(60)).unwrap();
        assert!(matches!(signer.verify::<Other>(&token), Err(TokenError::Invalid)));
    }
}
