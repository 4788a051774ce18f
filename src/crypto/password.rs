//! Argon2id password hashing.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$m=...`), so the salt and
//! cost parameters travel with the hash and older hashes keep verifying after
//! the configured cost changes.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::error::AppError;

#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    /// Verified when the account does not exist so both paths cost the same.
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32) -> Result<Self, AppError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| AppError::Config(format!("Invalid argon2 parameters: {}", e)))?;

        let mut hasher = PasswordHasher {
            params,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash("quillpost-timing-equalizer")?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Crypto(format!("Password hashing failed: {}", e)))?;

        Ok(hash.to_string())
    }

    /// Constant-time check of `password` against a stored PHC string.
    pub fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| AppError::Crypto(format!("Invalid stored hash: {}", e)))?;

        Ok(self
            .argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Burns the same work as a real verification and always fails.
    pub fn verify_dummy(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.dummy_hash);
        false
    }
}
