//! Password hashing.
//!
//! bcrypt is deliberately slow, so both directions run on tokio's blocking pool
//! and never stall the request executor.

use tracing::error;

/// Default bcrypt work factor.
pub const DEFAULT_COST: u32 = 12;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("bcrypt: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hash a password with a fresh random salt.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, HashError> {
    let password = password.to_owned();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hash)
}

/// Verify a password against a stored hash. Malformed hashes verify as false.
pub async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or_else(|e| {
            error!("Password verification task failed: {}", e);
            false
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum cost keeps the tests fast
    const TEST_COST: u32 = 4;

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hash = hash_password("correct horse", TEST_COST).await.unwrap();
        assert!(verify_password("correct horse", &hash).await);
        assert!(!verify_password("wrong horse", &hash).await);
    }

    #[tokio::test]
    async fn test_same_password_different_hashes() {
        let a = hash_password("hunter22", TEST_COST).await.unwrap();
        let b = hash_password("hunter22", TEST_COST).await.unwrap();
        assert_ne!(a, b);
        assert!(verify_password("hunter22", &a).await);
        assert!(verify_password("hunter22", &b).await);
    }

    #[tokio::test]
    async fn test_malformed_hash_is_false() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash").await);
        assert!(!verify_password("anything", "").await);
    }
}
