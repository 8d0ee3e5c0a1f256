//! Session token issuance and verification.
//!
//! Tokens are stateless: the only lifecycle bounds are the embedded expiry and
//! cookie deletion on the client side.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default session lifetime: 7 days
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted session lifetime: 365 days
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id (UUID)
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Outcome of checking a token. Invalid tokens are a value, not an error, so
/// callers can react uniformly regardless of the cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCheck {
    Valid(SessionClaims),
    Invalid(InvalidReason),
}

/// Why a token was rejected. Only ever used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    MissingSecret,
    Malformed,
    BadSignature,
    Expired,
}

impl TokenCheck {
    pub fn claims(self) -> Option<SessionClaims> {
        match self {
            TokenCheck::Valid(claims) => Some(claims),
            TokenCheck::Invalid(_) => None,
        }
    }
}

/// Result of issuing a token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: SessionClaims,
    /// Token duration in seconds
    pub duration: u64,
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    keys: Option<(EncodingKey, DecodingKey)>,
    lifetime_secs: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret and the default lifetime.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_lifetime(secret, DEFAULT_TOKEN_LIFETIME_SECS)
    }

    /// An empty secret produces a config that refuses to issue and treats every
    /// token as invalid.
    pub fn with_lifetime(secret: &[u8], lifetime_secs: u64) -> Self {
        let keys = (!secret.is_empty()).then(|| {
            (
                EncodingKey::from_secret(secret),
                DecodingKey::from_secret(secret),
            )
        });
        Self {
            keys,
            lifetime_secs,
        }
    }

    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime_secs
    }

    /// Issue a token for a user, valid for the configured lifetime from now.
    pub fn issue(&self, user_id: &str, email: &str) -> Result<IssuedToken, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();
        self.issue_at(user_id, email, now)
    }

    /// Issue a token as if it had been minted at `issued_at`.
    pub fn issue_at(
        &self,
        user_id: &str,
        email: &str,
        issued_at: u64,
    ) -> Result<IssuedToken, JwtError> {
        let (encoding_key, _) = self.keys.as_ref().ok_or(JwtError::MissingSecret)?;

        let claims = SessionClaims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(self.lifetime_secs),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            claims,
            duration: self.lifetime_secs,
        })
    }

    /// Check signature and expiry. Never fails; every problem collapses into
    /// `TokenCheck::Invalid`.
    pub fn verify(&self, token: &str) -> TokenCheck {
        let Some((_, decoding_key)) = self.keys.as_ref() else {
            return TokenCheck::Invalid(InvalidReason::MissingSecret);
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        match jsonwebtoken::decode::<SessionClaims>(token, decoding_key, &validation) {
            Ok(data) => TokenCheck::Valid(data.claims),
            Err(e) => {
                use jsonwebtoken::errors::ErrorKind;
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => InvalidReason::Expired,
                    ErrorKind::InvalidSignature => InvalidReason::BadSignature,
                    _ => InvalidReason::Malformed,
                };
                TokenCheck::Invalid(reason)
            }
        }
    }
}

/// Errors that can occur while issuing tokens.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("No signing secret configured")]
    MissingSecret,
    #[error("System time error")]
    TimeError,
}
