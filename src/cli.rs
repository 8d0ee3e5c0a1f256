//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::IpExtractor;
use crate::broker::{
    BrokerLimits, DEFAULT_DOWNLOAD_URL_SECS, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_UPLOAD_GRANT_SECS,
};
use crate::db::Database;
use crate::jwt::{DEFAULT_TOKEN_LIFETIME_SECS, MAX_TOKEN_LIFETIME_SECS};
use crate::password::DEFAULT_COST;
use crate::rate_limit::DEFAULT_AUTH_PER_MINUTE;
use crate::storage::{ObjectStore, S3Settings, S3Store};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "FileVault",
    about = "File storage with direct-to-storage uploads and cookie sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 7300)]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "filevault.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Session token lifetime in seconds
    #[arg(long, env = "TOKEN_LIFETIME_SECS", default_value_t = DEFAULT_TOKEN_LIFETIME_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_LIFETIME_SECS))]
    pub token_lifetime_secs: u64,

    /// Upload grant lifetime in seconds
    #[arg(long, env = "UPLOAD_GRANT_SECS", default_value_t = DEFAULT_UPLOAD_GRANT_SECS,
        value_parser = clap::value_parser!(u64).range(1..=604800))]
    pub upload_grant_secs: u64,

    /// Download URL lifetime in seconds
    #[arg(long, env = "DOWNLOAD_URL_SECS", default_value_t = DEFAULT_DOWNLOAD_URL_SECS,
        value_parser = clap::value_parser!(u64).range(1..=604800))]
    pub download_url_secs: u64,

    /// Largest accepted upload in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub max_upload_bytes: u64,

    /// bcrypt work factor
    #[arg(long, env = "BCRYPT_COST", default_value_t = DEFAULT_COST,
        value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,

    /// Object storage bucket
    #[arg(long, env = "S3_BUCKET")]
    pub bucket: String,

    /// Object storage region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub s3_region: String,

    /// Custom S3 endpoint (MinIO, LocalStack). Enables path-style addressing
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Production mode: marks cookies Secure
    #[arg(long, env = "FILEVAULT_PRODUCTION")]
    pub production: bool,

    /// Signin/signup attempts per minute per client IP
    #[arg(long, env = "AUTH_RATE_LIMIT", default_value_t = DEFAULT_AUTH_PER_MINUTE)]
    pub auth_rate_limit: u32,

    /// Header set by a trusted reverse proxy with the client IP (e.g. X-Forwarded-For).
    /// Without it the socket address is used
    #[arg(long, env = "TRUSTED_IP_HEADER", value_parser = IpExtractor::new)]
    pub trusted_ip_header: Option<IpExtractor>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn limits(&self) -> BrokerLimits {
        BrokerLimits {
            max_upload_bytes: self.max_upload_bytes,
            upload_grant: Duration::from_secs(self.upload_grant_secs),
            download_url: Duration::from_secs(self.download_url_secs),
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            bucket: self.bucket.clone(),
            region: self.s3_region.clone(),
            endpoint: self.s3_endpoint.clone(),
        }
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    validate_jwt_secret(secret)
}

fn validate_jwt_secret(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Connect to object storage, logging errors if it fails.
pub async fn connect_storage(settings: S3Settings) -> Option<Arc<dyn ObjectStore>> {
    match S3Store::connect(settings).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            error!(error = %e, "Failed to configure object storage");
            None
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    jwt_secret: String,
    storage: Arc<dyn ObjectStore>,
) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        token_lifetime_secs: args.token_lifetime_secs,
        storage,
        limits: args.limits(),
        secure_cookies: args.production,
        bcrypt_cost: args.bcrypt_cost,
        auth_rate_limit: args.auth_rate_limit,
        ip_extractor: args.trusted_ip_header.clone(),
    }
}
