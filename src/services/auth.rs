use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use zeroize::Zeroizing;

use crate::error::{AppError, Result};
use crate::models::user::User;
use crate::repositories::user::UserDirectory;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Verifies a password against a PHC-format hash.
///
/// Parameters are read from the hash itself.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password_bytes = Zeroizing::new(password.as_bytes().to_vec());
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Hash parse error: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok())
}

/// Authenticates a user.
///
/// Unknown users, inactive users and wrong passwords all produce the same error.
pub async fn authenticate_user(
    users: &dyn UserDirectory,
    username: &str,
    password: String,
) -> Result<User> {
    tracing::debug!("🔐 Authenticating user: {}", username);

    let user = users
        .find_by_username(username)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

    let password = Zeroizing::new(password);
    let hash = user.password.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))??;

    if !valid {
        return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
    }

    tracing::info!("✅ User authenticated: {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::{MemoryUserDirectory, hash_password};
    use uuid::Uuid;

    async fn directory_with(password: &str, is_active: bool) -> MemoryUserDirectory {
        let users = MemoryUserDirectory::new();
        users
            .insert(User {
                id: Uuid::new_v4(),
                full_name: "Ana Souza".to_string(),
                username: "ana".to_string(),
                email: None,
                password: hash_password(password).unwrap(),
                is_active,
            })
            .await;
        users
    }

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[tokio::test]
    async fn authenticate_accepts_valid_credentials() {
        let users = directory_with("s3cret-pass", true).await;
        let user = authenticate_user(&users, "ana", "s3cret-pass".to_string())
            .await
            .unwrap();
        assert_eq!(user.username, "ana");
    }

    #[tokio::test]
    async fn authenticate_rejects_wrong_password_and_inactive_user() {
        let users = directory_with("s3cret-pass", true).await;
        assert!(matches!(
            authenticate_user(&users, "ana", "nope-nope".to_string()).await,
            Err(AppError::Authentication(_))
        ));

        let inactive = directory_with("s3cret-pass", false).await;
        assert!(matches!(
            authenticate_user(&inactive, "ana", "s3cret-pass".to_string()).await,
            Err(AppError::Authentication(_))
        ));

        assert!(matches!(
            authenticate_user(&users, "bruno", "s3cret-pass".to_string()).await,
            Err(AppError::Authentication(_))
        ));
    }
}
