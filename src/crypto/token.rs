use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// Fixed session lifetime.
pub const TOKEN_LIFETIME_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Why a token was refused. Never shown to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
}

/// Issues and verifies HS256 session tokens with a process-wide secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Result<Self, AppError> {
        if secret.trim().is_empty() {
            return Err(AppError::Config("JWT secret must not be empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(TokenService {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue(&self, account_id: &str) -> Result<String, AppError> {
        self.issue_at(account_id, Utc::now().timestamp())
    }

    /// Issues a token as if it had been created at `issued_at` (unix seconds).
    pub fn issue_at(&self, account_id: &str, issued_at: i64) -> Result<String, AppError> {
        let claims = Claims {
            sub: account_id.to_string(),
            iat: issued_at,
            exp: issued_at + Duration::days(TOKEN_LIFETIME_DAYS).num_seconds(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Crypto(format!("Token signing failed: {}", e)))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    /// Returns the account id carried by a valid token.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.decode(token).map(|claims| claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("unit-test-secret").unwrap()
    }

    #[test]
    fn round_trip_resolves_subject() {
        let tokens = service();
        let token = tokens.issue("account-a").unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), "account-a");
    }

    #[test]
    fn lifetime_is_thirty_days() {
        let tokens = service();
        let token = tokens.issue_at("a", 1_000).unwrap();
        // Far in the past, so decode reports expiry rather than the claims.
        assert_eq!(tokens.decode(&token), Err(TokenError::Expired));

        let now = Utc::now().timestamp();
        let claims = tokens.decode(&tokens.issue_at("a", now).unwrap()).unwrap();
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 3600);
    }

    #[test]
    fn tampered_signature_is_invalid() {
        let tokens = service();
        let token = tokens.issue("account-a").unwrap();

        let (rest, sig) = token.rsplit_once('.').unwrap();
        let flipped = if sig.starts_with('A') { 'B' } else { 'A' };
        let tampered = format!("{}.{}{}", rest, flipped, &sig[1..]);

        assert_eq!(tokens.verify(&tampered), Err(TokenError::Invalid));
    }

    #[test]
    fn foreign_secret_is_invalid() {
        let token = TokenService::new("other-secret").unwrap().issue("a").unwrap();
        assert_eq!(service().verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let tokens = service();
        let issued = Utc::now().timestamp() - Duration::days(31).num_seconds();
        let token = tokens.issue_at("account-a", issued).unwrap();
        assert_eq!(tokens.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(service().verify("not.a.jwt"), Err(TokenError::Invalid));
        assert_eq!(service().verify(""), Err(TokenError::Invalid));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(TokenService::new("").is_err());
    }
}
