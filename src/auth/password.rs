//! Password hashing for the credential records.
//!
//! bcrypt at a deliberately expensive cost. Inputs past bcrypt's 72-byte
//! limit are refused instead of being silently truncated.

use crate::error::AuthError;

pub const DEFAULT_COST: u32 = 14;
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    cost: u32,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cheaper work factor, for tests and local development settings.
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::HashingError(format!(
                "password longer than {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }
        Ok(bcrypt::hash(plaintext, self.cost)?)
    }

    /// Never errors: a corrupt hash and a wrong password look the same.
    pub fn verify(&self, hash: &str, plaintext: &str) -> bool {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return false;
        }
        bcrypt::verify(plaintext, hash).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::with_cost(4)
    }

    #[test]
    fn test_hash_then_verify() {
        let store = store();
        let hash = store.hash("correct-horse").unwrap();

        assert_ne!(hash, "correct-horse");
        assert!(store.verify(&hash, "correct-horse"));
        assert!(!store.verify(&hash, "wrong"));
        assert!(!store.verify(&hash, "correct-horse "));
        assert!(!store.verify(&hash, ""));
    }

    #[test]
    fn test_hashes_are_salted() {
        let store = store();
        let a = store.hash("same-password").unwrap();
        let b = store.hash("same-password").unwrap();
        assert_ne!(a, b);
        assert!(store.verify(&a, "same-password"));
        assert!(store.verify(&b, "same-password"));
    }

    #[test]
    fn test_cost_is_encoded_in_hash() {
        let hash = store().hash("pw").unwrap();
        assert!(hash.starts_with("$2b$04$"), "unexpected hash prefix: {}", hash);
        assert_eq!(CredentialStore::new().cost(), 14);
    }

    #[test]
    fn test_overlong_password_is_refused() {
        let store = store();
        let long = "x".repeat(MAX_PASSWORD_BYTES + 1);
        assert!(matches!(store.hash(&long), Err(AuthError::HashingError(_))));

        // must not match a hash of its 72-byte prefix
        let prefix_hash = store.hash(&long[..MAX_PASSWORD_BYTES]).unwrap();
        assert!(!store.verify(&prefix_hash, &long));
    }

    #[test]
    fn test_invalid_cost_is_an_error() {
        let result = CredentialStore::with_cost(2).hash("pw");
        assert!(matches!(result, Err(AuthError::HashingError(_))));
    }

    #[test]
    fn test_corrupt_hash_never_matches() {
        let store = store();
        assert!(!store.verify("not-a-bcrypt-hash", "pw"));
        assert!(!store.verify("", "pw"));
    }
}
