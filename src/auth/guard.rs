//! Session guard middleware.
//!
//! Runs in front of every route. Public paths pass through untouched. Every
//! other path needs a valid `auth-token` cookie; the verified identity is
//! attached to the request for the `Session` extractor. Pages are redirected
//! to signin on failure, API routes get a 401.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::cookie::{AUTH_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, PageAuthError, StaleCookie};
use super::state::HasAuthBackend;
use super::types::Identity;
use crate::jwt::TokenCheck;

/// Paths reachable without a session, compared after stripping one trailing slash.
const PUBLIC_PATHS: &[&str] = &[
    "/",
    "/signin",
    "/signup",
    "/api/auth/signin",
    "/api/auth/signup",
    "/api/auth/signout",
    "/api/health",
];

const API_PREFIX: &str = "/api/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    ProtectedPage,
    ProtectedApi,
}

pub fn classify(path: &str) -> RouteClass {
    let normalized = match path.strip_suffix('/') {
        Some("") | None => path,
        Some(stripped) => stripped,
    };

    if PUBLIC_PATHS.contains(&normalized) {
        RouteClass::Public
    } else if normalized == "/api" || normalized.starts_with(API_PREFIX) {
        RouteClass::ProtectedApi
    } else {
        RouteClass::ProtectedPage
    }
}

fn reject(class: RouteClass, cookie: StaleCookie) -> Response {
    match class {
        RouteClass::ProtectedApi => ApiAuthError::new(cookie).into_response(),
        _ => PageAuthError::new(cookie).into_response(),
    }
}

/// Middleware gating every request on a valid session token.
pub async fn session_guard<S>(State(state): State<S>, mut request: Request, next: Next) -> Response
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    let class = classify(request.uri().path());
    if class == RouteClass::Public {
        return next.run(request).await;
    }

    let Some(token) = get_cookie(request.headers(), AUTH_COOKIE_NAME) else {
        debug!(path = %request.uri().path(), "No session cookie");
        return reject(class, StaleCookie::Keep);
    };

    match state.jwt().verify(token) {
        TokenCheck::Valid(claims) => {
            request.extensions_mut().insert(Identity::from(claims));
            next.run(request).await
        }
        TokenCheck::Invalid(reason) => {
            debug!(path = %request.uri().path(), ?reason, "Rejected session token");
            reject(
                class,
                StaleCookie::Clear {
                    secure: state.secure_cookies(),
                },
            )
        }
    }
}
