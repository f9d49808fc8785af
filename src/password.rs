//! Password hashing with bcrypt, run on the blocking thread pool.

use tokio::task;

/// Errors from hashing or verifying a password.
#[derive(Debug)]
pub enum PasswordError {
    Bcrypt(bcrypt::BcryptError),
    Join(task::JoinError),
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::Bcrypt(e) => write!(f, "Password hashing failed: {}", e),
            PasswordError::Join(e) => write!(f, "Password task failed: {}", e),
        }
    }
}

impl std::error::Error for PasswordError {}

/// Hash a password with the given bcrypt cost.
pub async fn hash_password(password: String, cost: u32) -> Result<String, PasswordError> {
    task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(PasswordError::Join)?
        .map_err(PasswordError::Bcrypt)
}

/// Check a password against a stored hash. The comparison is constant-time.
pub async fn verify_password(password: String, hash: String) -> Result<bool, PasswordError> {
    task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(PasswordError::Join)?
        .map_err(PasswordError::Bcrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("Password1".into(), 4).await.unwrap();
        assert_ne!(hash, "Password1");

        assert!(verify_password("Password1".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("Password2".into(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let a = hash_password("Password1".into(), 4).await.unwrap();
        let b = hash_password("Password1".into(), 4).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_malformed_hash_is_error() {
        assert!(verify_password("Password1".into(), "not-a-hash".into()).await.is_err());
    }
}
