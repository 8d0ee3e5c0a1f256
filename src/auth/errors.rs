//! Authentication rejection responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;

use super::cookie::clear_session_cookie;

/// Where protected pages send unauthenticated visitors.
pub const SIGNIN_PATH: &str = "/signin";

/// Cookie handling attached to a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleCookie {
    Keep,
    /// Delete the presented cookie so a permanently bad token cannot loop.
    Clear { secure: bool },
}

/// API authentication error: 401 JSON.
#[derive(Debug)]
pub struct ApiAuthError {
    cookie: StaleCookie,
}

impl ApiAuthError {
    pub fn new(cookie: StaleCookie) -> Self {
        Self { cookie }
    }
}

/// Page authentication error: redirect to the signin page.
#[derive(Debug)]
pub struct PageAuthError {
    cookie: StaleCookie,
}

impl PageAuthError {
    pub fn new(cookie: StaleCookie) -> Self {
        Self { cookie }
    }
}

fn apply_cookie(mut response: Response, cookie: StaleCookie) -> Response {
    if let StaleCookie::Clear { secure } = cookie {
        if let Ok(value) = HeaderValue::from_str(&clear_session_cookie(secure)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let response = (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Not authenticated",
            }),
        )
            .into_response();

        apply_cookie(response, self.cookie)
    }
}

impl IntoResponse for PageAuthError {
    fn into_response(self) -> Response {
        apply_cookie(Redirect::temporary(SIGNIN_PATH).into_response(), self.cookie)
    }
}
