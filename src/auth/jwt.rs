//! JWT Token Codec
//! Mission: Issue and verify self-contained, signed, time-bounded tokens

use crate::auth::models::{Claims, Principal};
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{crypto, decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Why a presented token was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is not a well-formed JWT")]
    Malformed,
    #[error("token has expired")]
    Expired,
    /// Signature does not match the payload. Never retried.
    #[error("token signature is invalid")]
    Tampered,
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
    pub expires_in: i64, // seconds
}

/// Signs principals into tokens and turns tokens back into principals.
///
/// Verification is pure: no store lookup, no shared mutable state.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
    leeway_secs: i64,
}

impl TokenCodec {
    /// Create a codec with the server-held secret and a TTL in hours
    pub fn new(secret: &[u8], ttl_hours: i64) -> Result<Self> {
        let ttl_secs = ttl_hours
            .checked_mul(3600)
            .filter(|secs| *secs > 0)
            .context("Token TTL must be a positive number of hours that fits in seconds")?;

        let mut validation = Validation::new(ALGORITHM);
        // Expiry is checked by `verify_at` against an explicit clock.
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl_secs,
            leeway_secs: 0,
        })
    }

    /// Accept tokens up to `secs` past their expiry to absorb clock skew
    pub fn with_leeway(mut self, secs: i64) -> Self {
        self.leeway_secs = secs.max(0);
        self
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Generate a token for a principal
    pub fn issue(&self, principal: &Principal) -> Result<IssuedToken> {
        self.issue_at(principal, Utc::now().timestamp())
    }

    pub fn issue_at(&self, principal: &Principal, now: i64) -> Result<IssuedToken> {
        let expires_at = now
            .checked_add(self.ttl_secs)
            .context("Invalid timestamp")?;

        let claims = Claims {
            sub: principal.id.to_string(),
            username: principal.username.clone(),
            authorities: principal.authorities.iter().cloned().collect(),
            iat: now,
            exp: expires_at,
        };

        debug!(
            "Generating JWT for user {} ({}), expires in {}s",
            principal.username, principal.id, self.ttl_secs
        );

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .context("Failed to generate JWT")?;

        Ok(IssuedToken {
            token,
            expires_at,
            expires_in: self.ttl_secs,
        })
    }

    /// Validate a token and extract the principal
    pub fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Signature first, then expiry, then decoding of the subject.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Principal, TokenError> {
        let (message, signature) = split_token(token)?;

        let valid = crypto::verify(signature, message.as_bytes(), &self.decoding_key, ALGORITHM)
            .map_err(|_| TokenError::Tampered)?;
        if !valid {
            return Err(TokenError::Tampered);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| TokenError::Malformed)?
            .claims;

        if now >= claims.exp.saturating_add(self.leeway_secs) {
            return Err(TokenError::Expired);
        }

        let id = Uuid::parse_str(&claims.sub).map_err(|_| TokenError::Malformed)?;

        debug!("Validated JWT for user {}", claims.username);

        Ok(Principal {
            id,
            username: claims.username,
            authorities: claims.authorities.into_iter().collect(),
        })
    }
}

/// Split a token into the signed message (everything before the last dot)
/// and the signature.
///
/// Anything with fewer than three segments is not a JWT at all. From three
/// segments on, the signature decides: an extra or empty segment can only
/// come from an altered token, and must surface as `Tampered`.
fn split_token(token: &str) -> Result<(&str, &str), TokenError> {
    if token.split('.').count() < 3 {
        return Err(TokenError::Malformed);
    }
    token.rsplit_once('.').ok_or(TokenError::Malformed)
}
