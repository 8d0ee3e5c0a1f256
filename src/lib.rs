pub mod api;
pub mod auth;
pub mod broker;
pub mod cli;
pub mod db;
pub mod error;
pub mod jwt;
pub mod monitor;
pub mod pages;
pub mod password;
pub mod rate_limit;
pub mod storage;

use api::create_api_router;
use auth::{AuthService, IpExtractor, session_guard};
use axum::{Router, middleware};
use broker::{BrokerLimits, UploadBroker};
use db::Database;
use jwt::JwtConfig;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use storage::ObjectStore;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Session token lifetime in seconds, also the cookie Max-Age
    pub token_lifetime_secs: u64,
    /// Object storage backend
    pub storage: Arc<dyn ObjectStore>,
    /// Upload size ceiling and signed URL lifetimes
    pub limits: BrokerLimits,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
    /// Signin/signup attempts per minute per client IP
    pub auth_rate_limit: u32,
    /// Header carrying the client IP from a trusted proxy
    pub ip_extractor: Option<IpExtractor>,
}

/// State the session guard needs.
#[derive(Clone)]
struct GuardState {
    jwt: Arc<JwtConfig>,
    secure_cookies: bool,
}

impl_has_auth_backend!(GuardState);

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_lifetime(
        &config.jwt_secret,
        config.token_lifetime_secs,
    ));

    let service = AuthService::new(config.db.clone(), jwt.clone(), config.bcrypt_cost);
    let broker = UploadBroker::new(config.db.clone(), config.storage.clone(), config.limits);
    let rate_limit = Arc::new(
        RateLimitConfig::per_minute(config.auth_rate_limit)
            .with_ip_extractor(config.ip_extractor.clone()),
    );

    let api_router = create_api_router(
        service,
        broker,
        jwt.clone(),
        config.secure_cookies,
        rate_limit,
    );

    let guard_state = GuardState {
        jwt,
        secure_cookies: config.secure_cookies,
    };

    // The guard wraps everything, including unmatched paths.
    Router::new()
        .nest("/api", api_router)
        .merge(pages::router())
        .layer(middleware::from_fn_with_state(
            guard_state,
            session_guard::<GuardState>,
        ))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
