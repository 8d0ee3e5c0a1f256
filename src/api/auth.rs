//! Account and session API endpoints.
//!
//! - POST `/signup` - Create an account and set the session cookie
//! - POST `/signin` - Check credentials and set the session cookie
//! - POST `/signout` - Clear the session cookie
//! - GET `/session` - Describe the current session
//! - POST `/refresh` - Reissue the session token for the same user

use axum::{
    Json, Router,
    extract::State,
    http::header::SET_COOKIE,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ApiJson};
use crate::auth::{
    ApiAuthError, AuthService, Authenticated, HasAuthBackend, PublicUser, Session, SignUp,
    StaleCookie, clear_session_cookie, session_cookie,
};
use crate::error::AppError;
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_auth};

#[derive(Clone)]
pub struct AuthState {
    pub service: AuthService,
    pub jwt: Arc<JwtConfig>,
    pub secure_cookies: bool,
    pub rate_limit: Arc<RateLimitConfig>,
}

crate::impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let limited = Router::new()
        .route("/signup", post(sign_up))
        .route("/signin", post(sign_in))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_auth,
        ));

    Router::new()
        .route("/signout", post(sign_out))
        .route("/session", get(session))
        .route("/refresh", post(refresh))
        .merge(limited)
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Deserialize)]
struct SignInRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct AuthResponse {
    message: &'static str,
    user: PublicUser,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    is_authenticated: bool,
    user: Option<PublicUser>,
    session_expiry: Option<String>,
    last_activity: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    user: PublicUser,
    session_expiry: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

fn rfc3339(unix_secs: u64) -> Option<String> {
    let secs = i64::try_from(unix_secs).ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0).map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Respond with `body` and install the token from `auth` as the session cookie.
fn with_session_cookie(
    state: &AuthState,
    auth: &Authenticated,
    body: impl Serialize,
) -> Response {
    let cookie = session_cookie(&auth.token.token, auth.token.duration, state.secure_cookies());
    ([(SET_COOKIE, cookie)], Json(body)).into_response()
}

async fn sign_up(
    State(state): State<AuthState>,
    ApiJson(req): ApiJson<SignUpRequest>,
) -> Result<Response, ApiError> {
    let auth = state
        .service
        .sign_up(SignUp {
            email: &req.email,
            password: &req.password,
            first_name: &req.first_name,
            last_name: &req.last_name,
        })
        .await?;

    let body = AuthResponse {
        message: "User created successfully",
        user: auth.user.clone(),
    };
    Ok(with_session_cookie(&state, &auth, body))
}

async fn sign_in(
    State(state): State<AuthState>,
    ApiJson(req): ApiJson<SignInRequest>,
) -> Result<Response, ApiError> {
    let auth = state.service.sign_in(&req.email, &req.password).await?;

    let body = AuthResponse {
        message: "Signed in successfully",
        user: auth.user.clone(),
    };
    Ok(with_session_cookie(&state, &auth, body))
}

/// Always succeeds; the token itself stays valid until its expiry.
async fn sign_out(State(state): State<AuthState>) -> impl IntoResponse {
    (
        [(SET_COOKIE, clear_session_cookie(state.secure_cookies()))],
        Json(MessageResponse {
            message: "Signed out successfully",
        }),
    )
}

async fn session(
    State(state): State<AuthState>,
    Session(identity): Session,
) -> Result<Json<SessionResponse>, ApiError> {
    let response = match state.service.current_user(&identity).await? {
        Some(user) => SessionResponse {
            is_authenticated: true,
            user: Some(PublicUser::from(&user)),
            session_expiry: rfc3339(identity.expires_at),
            last_activity: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        },
        None => SessionResponse {
            is_authenticated: false,
            user: None,
            session_expiry: None,
            last_activity: None,
        },
    };
    Ok(Json(response))
}

async fn refresh(
    State(state): State<AuthState>,
    Session(identity): Session,
) -> Result<Response, ApiError> {
    match state.service.refresh(&identity).await {
        Ok(auth) => {
            let body = RefreshResponse {
                user: auth.user.clone(),
                session_expiry: rfc3339(auth.token.claims.exp),
            };
            Ok(with_session_cookie(&state, &auth, body))
        }
        Err(AppError::Unauthorized) => {
            info!(user_id = %identity.user_id, "Refresh for missing user, clearing session");
            Ok(ApiAuthError::new(StaleCookie::Clear {
                secure: state.secure_cookies(),
            })
            .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_from_unix() {
        assert_eq!(rfc3339(0).as_deref(), Some("1970-01-01T00:00:00Z"));
        assert_eq!(
            rfc3339(1_700_000_000).as_deref(),
            Some("2023-11-14T22:13:20Z")
        );
        assert_eq!(rfc3339(u64::MAX), None);
    }
}
