//! Object storage backend.
//!
//! The server never handles file bytes. It signs URLs for direct client
//! transfer and checks or removes objects by key.

mod s3;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub use s3::{S3Settings, S3Store};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage configuration: {0}")]
    Config(String),

    #[error("Failed to sign request: {0}")]
    Presign(String),

    #[error("Storage request failed: {0}")]
    Request(String),
}

/// A signed request the client performs against storage directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedRequest {
    pub url: String,
    pub method: String,
    /// Headers the client must send verbatim; they are covered by the signature.
    pub headers: BTreeMap<String, String>,
}

/// Metadata of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket recorded alongside file metadata.
    fn bucket(&self) -> &str;

    /// Sign a PUT for exactly one object with a fixed content type and length.
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        content_length: u64,
        expires_in: Duration,
    ) -> Result<PresignedRequest, StorageError>;

    /// Sign a read-only GET. `download_name` becomes the attachment filename.
    async fn presign_download(
        &self,
        key: &str,
        download_name: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    /// Look up an object. `Ok(None)` means it does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Content-Disposition value for a download, with quotes and control
/// characters removed from the name.
pub fn attachment_disposition(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    format!("attachment; filename=\"{}\"", cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_disposition_strips_quotes() {
        assert_eq!(
            attachment_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            attachment_disposition("a\"b\\c\n.txt"),
            "attachment; filename=\"abc.txt\""
        );
    }
}
