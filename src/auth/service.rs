use crate::auth::password::{CredentialStore, MAX_PASSWORD_BYTES};
use crate::db::models::User;
use crate::db::operations::DbOperations;
use crate::error::{AppError, AuthError};
use tracing::{info, warn};

/// Signup and login against the credential records.
///
/// bcrypt work runs on the blocking pool so a slow hash never stalls the
/// request workers.
pub struct AuthService {
    db: DbOperations,
    passwords: CredentialStore,
    // Compared against when the email is unknown, so both failure paths
    // cost one full bcrypt verification.
    decoy_hash: String,
}

impl AuthService {
    pub async fn new(db: DbOperations, passwords: CredentialStore) -> Result<Self, AppError> {
        let decoy_hash = hash_blocking(&passwords, "decoy-password-never-matches".to_string()).await?;
        Ok(Self {
            db,
            passwords,
            decoy_hash,
        })
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User, AppError> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        let password_hash = hash_blocking(&self.passwords, password.to_string()).await?;
        let user = User::new(email, password_hash, display_name.map(str::to_string));

        let created = self.db.create_user(&user).await?;
        info!("Registered user {}", created.id);
        Ok(created)
    }

    /// Unknown email and wrong password both end in `InvalidCredentials`.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let user = self.db.get_user_by_email(&email).await?;

        let hash = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.decoy_hash.clone());
        let matched = verify_blocking(&self.passwords, hash, password.to_string()).await?;

        match user {
            Some(user) if matched => {
                info!("User {} authenticated", user.id);
                Ok(user)
            }
            _ => {
                warn!("Failed login attempt");
                Err(AuthError::InvalidCredentials.into())
            }
        }
    }
}

async fn hash_blocking(passwords: &CredentialStore, password: String) -> Result<String, AppError> {
    let passwords = passwords.clone();
    let hash = tokio::task::spawn_blocking(move || passwords.hash(&password))
        .await
        .map_err(|e| AppError::InternalError(format!("hashing task failed: {}", e)))??;
    Ok(hash)
}

async fn verify_blocking(
    passwords: &CredentialStore,
    hash: String,
    password: String,
) -> Result<bool, AppError> {
    let passwords = passwords.clone();
    tokio::task::spawn_blocking(move || passwords.verify(&hash, &password))
        .await
        .map_err(|e| AppError::InternalError(format!("verification task failed: {}", e)))
}

pub(crate) fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AppError::ValidationError("a valid email is required".into())),
    }
}

pub(crate) fn validate_password(password: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::ValidationError("password is required".into()));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::ValidationError(format!(
            "password must be at most {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Judy@Example.COM ").unwrap(), "judy@example.com");
        assert!(normalize_email("").is_err());
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("judy@").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("hunter2").is_ok());
        assert!(matches!(validate_password(""), Err(AppError::ValidationError(_))));
        let long = "p".repeat(MAX_PASSWORD_BYTES + 1);
        assert!(matches!(validate_password(&long), Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_blocking_hash_roundtrip() {
        let store = CredentialStore::with_cost(4);
        let hash = hash_blocking(&store, "correct-horse".into()).await.unwrap();
        assert!(verify_blocking(&store, hash.clone(), "correct-horse".into()).await.unwrap());
        assert!(!verify_blocking(&store, hash, "wrong".into()).await.unwrap());
    }
}
