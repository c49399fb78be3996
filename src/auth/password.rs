//! One-way password hashing with Argon2id.

use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::password_hash::{PasswordHasher as _, PasswordVerifier as _};
use argon2::Argon2;

/// Salted, irreversible password hashing.
///
/// Hashes are PHC strings carrying the salt and parameters, so verification
/// needs no extra state. Mismatch surfaces only as `false`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(hash.to_string())
    }

    /// Check a password against a stored PHC hash string.
    ///
    /// Unparseable hashes verify as `false` rather than erroring; a corrupt
    /// stored hash must never let a login through.
    #[must_use]
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(password_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_not_the_password() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("secret1").expect("hash");
        assert_ne!(hash, "secret1");
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn verify_accepts_matching_password() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("secret1").expect("hash");
        assert!(hasher.verify("secret1", &hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("secret1").expect("hash");
        assert!(!hasher.verify("secret2", &hash));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        let hasher = PasswordHasher::new();
        assert!(!hasher.verify("secret1", "not-a-phc-string"));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = PasswordHasher::new();
        let first = hasher.hash("secret1").expect("hash");
        let second = hasher.hash("secret1").expect("hash");
        assert_ne!(first, second);
    }
}
