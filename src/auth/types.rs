//! Request-scoped identity.

use crate::jwt::SessionClaims;

/// Identity established by the session guard from a verified token.
/// Inserted once into request extensions and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    /// Unix timestamp at which the presenting token expires
    pub expires_at: u64,
}

impl From<SessionClaims> for Identity {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            expires_at: claims.exp,
        }
    }
}
