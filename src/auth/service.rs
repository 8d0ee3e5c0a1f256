//! Account operations: signup, signin, token refresh and session lookup.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::types::Identity;
use crate::db::{Database, NewUser, User, is_unique_violation};
use crate::error::{AppError, DependencyExt, Validator};
use crate::jwt::{IssuedToken, JwtConfig};
use crate::password::{hash_password, verify_password};

pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_EMAIL_LENGTH: usize = 254;
const EMAIL_TAKEN: &str = "User with this email already exists";

/// User fields safe to return to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: String,
    pub last_signed_in_at: Option<String>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            created_at: user.created_at.clone(),
            last_signed_in_at: user.last_signed_in_at.clone(),
        }
    }
}

/// A user together with a freshly issued session token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: PublicUser,
    pub token: IssuedToken,
}

#[derive(Debug, Clone, Copy)]
pub struct SignUp<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    jwt: Arc<JwtConfig>,
    bcrypt_cost: u32,
}

/// Trim and lowercase an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Structural email check: one `@`, non-empty local part, dotted domain,
/// no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return false;
    }
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

impl AuthService {
    pub fn new(db: Database, jwt: Arc<JwtConfig>, bcrypt_cost: u32) -> Self {
        Self {
            db,
            jwt,
            bcrypt_cost,
        }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    fn issue(&self, user: &User) -> Result<Authenticated, AppError> {
        let token = self
            .jwt
            .issue(&user.id, &user.email)
            .dependency("Failed to issue session token")?;
        Ok(Authenticated {
            user: PublicUser::from(user),
            token,
        })
    }

    /// Register a new account and sign it in.
    pub async fn sign_up(&self, input: SignUp<'_>) -> Result<Authenticated, AppError> {
        let email = normalize_email(input.email);
        let first_name = input.first_name.trim();
        let last_name = input.last_name.trim();

        let mut v = Validator::new();
        v.check(is_valid_email(&email), "email", "Invalid email address")
            .check(
                input.password.chars().count() >= MIN_PASSWORD_LENGTH,
                "password",
                "Password must be at least 8 characters",
            )
            .check(!first_name.is_empty(), "firstName", "First name is required")
            .check(!last_name.is_empty(), "lastName", "Last name is required");
        v.finish()?;

        let users = self.db.users();
        if users
            .email_exists(&email)
            .await
            .dependency("Failed to check existing user")?
        {
            debug!("Signup rejected: email already registered");
            return Err(AppError::Conflict(EMAIL_TAKEN.into()));
        }

        let password_hash = hash_password(input.password, self.bcrypt_cost)
            .await
            .dependency("Failed to hash password")?;

        let new_user = NewUser {
            email: &email,
            password_hash: &password_hash,
            first_name,
            last_name,
        };

        // The UNIQUE constraint settles concurrent signups for the same email.
        let user = match users.create(&new_user).await {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict(EMAIL_TAKEN.into()));
            }
            Err(e) => return Err(AppError::dependency("Failed to create user", e)),
        };

        info!(user_id = %user.id, "User signed up");
        self.issue(&user)
    }

    /// Check credentials. Unknown email and wrong password fail identically.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Authenticated, AppError> {
        let email = normalize_email(email);

        let mut v = Validator::new();
        v.check(is_valid_email(&email), "email", "Invalid email address")
            .check(!password.is_empty(), "password", "Password is required");
        v.finish()?;

        let Some(user) = self
            .db
            .users()
            .get_by_email(&email)
            .await
            .dependency("Failed to look up user")?
        else {
            debug!("Signin failed: unknown email");
            return Err(AppError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash).await {
            debug!(user_id = %user.id, "Signin failed: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        self.db
            .users()
            .touch_signed_in(&user.id)
            .await
            .dependency("Failed to record signin")?;

        let user = self
            .db
            .users()
            .get_by_id(&user.id)
            .await
            .dependency("Failed to reload user")?
            .ok_or(AppError::InvalidCredentials)?;

        info!(user_id = %user.id, "User signed in");
        self.issue(&user)
    }

    /// Issue a new token for the same identity, provided the account still exists.
    pub async fn refresh(&self, identity: &Identity) -> Result<Authenticated, AppError> {
        let user = self
            .current_user(identity)
            .await?
            .ok_or(AppError::Unauthorized)?;

        debug!(user_id = %user.id, "Session token refreshed");
        self.issue(&user)
    }

    /// Load the account behind a session, if it still exists.
    pub async fn current_user(&self, identity: &Identity) -> Result<Option<User>, AppError> {
        self.db
            .users()
            .get_by_id(&identity.user_id)
            .await
            .dependency("Failed to look up user")
    }
}
