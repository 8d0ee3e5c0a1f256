//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::{ApiAuthError, StaleCookie};
use super::types::Identity;

/// Extractor for handlers behind the session guard.
///
/// Reads the identity the guard attached to the request. A handler mounted
/// outside the guard gets a 401 rather than an unauthenticated request.
pub struct Session(pub Identity);

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Session)
            .ok_or_else(|| ApiAuthError::new(StaleCookie::Keep))
    }
}
