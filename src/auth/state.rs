//! Authentication state trait and macro.

use crate::jwt::JwtConfig;

/// Trait for state types that can verify session tokens and write cookies.
pub trait HasAuthBackend {
    fn jwt(&self) -> &JwtConfig;
    fn secure_cookies(&self) -> bool;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `jwt: Arc<JwtConfig>`
/// - `secure_cookies: bool`
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn jwt(&self) -> &$crate::jwt::JwtConfig {
                &self.jwt
            }
            fn secure_cookies(&self) -> bool {
                self.secure_cookies
            }
        }
    };
}
