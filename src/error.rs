//! Domain error taxonomy shared by the auth service, upload broker and file registry.
//!
//! Every core operation returns `Result<T, AppError>`. HTTP mapping lives in
//! `api::error`; nothing here knows about status codes.

use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input.
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    /// Signin failure. Same shape for unknown email and wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Missing or invalid session.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource absent or not owned by the caller.
    #[error("not found")]
    NotFound,

    /// Email already registered.
    #[error("{0}")]
    Conflict(String),

    /// Storage, database or worker failure. The message is for logs only.
    #[error("dependency failure: {0}")]
    Dependency(String),
}

impl AppError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn dependency(context: &str, e: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", context, e);
        Self::Dependency(context.to_string())
    }
}

/// Extension trait for folding lower-level failures into `AppError::Dependency`.
pub trait DependencyExt<T> {
    fn dependency(self, context: &str) -> Result<T, AppError>;
}

impl<T, E: std::fmt::Display> DependencyExt<T> for Result<T, E> {
    fn dependency(self, context: &str) -> Result<T, AppError> {
        self.map_err(|e| AppError::dependency(context, e))
    }
}

/// Collects field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &'static str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}
