//! Cookie-carried session tokens.
//!
//! A single stateless token (`auth-token`) identifies the user. The session
//! guard verifies it on every request and hands the identity to handlers via
//! the `Session` extractor.

mod cookie;
mod errors;
mod extractors;
mod guard;
mod ip;
mod service;
mod state;
mod types;

pub use cookie::{AUTH_COOKIE_NAME, clear_session_cookie, get_cookie, session_cookie};
pub use errors::{ApiAuthError, PageAuthError, SIGNIN_PATH, StaleCookie};
pub use extractors::Session;
pub use guard::{RouteClass, classify, session_guard};
pub use ip::{HasHeadersAndExtensions, IpExtractor, UNKNOWN_CLIENT, extract_client_ip};
pub use service::{
    AuthService, Authenticated, MIN_PASSWORD_LENGTH, PublicUser, SignUp, is_valid_email,
    normalize_email,
};
pub use state::HasAuthBackend;
pub use types::Identity;
