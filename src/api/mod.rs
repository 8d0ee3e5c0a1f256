mod auth;
mod error;
mod files;

use axum::{Json, Router, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::broker::UploadBroker;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;

pub use auth::AuthState;
pub use error::{ApiError, ApiJson};
pub use files::FilesState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Create the API router.
pub fn create_api_router(
    service: AuthService,
    broker: UploadBroker,
    jwt: Arc<JwtConfig>,
    secure_cookies: bool,
    rate_limit: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        service,
        jwt,
        secure_cookies,
        rate_limit,
    };

    let files_state = files::FilesState { broker };

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(auth_state))
        .nest("/files", files::router(files_state))
}
