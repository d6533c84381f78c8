//! HS256 bearer token verification.

use crate::models::principal::Claims;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid JWT: {0}")]
pub struct InvalidToken(#[from] jsonwebtoken::errors::Error);

pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Audience is not part of the trust model; roles come from `role`.
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Check the signature and expiry, returning the embedded claims.
    pub fn verify(&self, token: &str) -> Result<Claims, InvalidToken> {
        Ok(decode::<Claims>(token, &self.decoding, &self.validation)?.claims)
    }

    /// Issue a token for `claims`. Used by tooling and tests.
    pub fn sign(&self, claims: &Claims) -> Result<String, InvalidToken> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }
}
