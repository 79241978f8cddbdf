//! Argon2 password hashing

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};

use super::IdentityError;

/// Hashes and verifies passwords with fixed Argon2id parameters
#[derive(Clone)]
pub struct PasswordHashing {
    argon2: Argon2<'static>,
}

impl PasswordHashing {
    pub fn new(memory_kib: u32, iterations: u32) -> Result<Self, IdentityError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| IdentityError::Internal(format!("Invalid argon2 parameters: {}", e)))?;
        Ok(PasswordHashing { argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params) })
    }

    pub fn hash(&self, password: &str) -> Result<SecretString, IdentityError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| IdentityError::Internal(format!("Password hashing failed: {}", e)))?;
        Ok(SecretString::new(hash.to_string()))
    }

    /// Returns false for a wrong password or an unparseable stored hash
    pub fn verify(&self, password: &str, stored: &SecretString) -> bool {
        let Ok(parsed) = PasswordHash::new(stored.expose_secret()) else {
            tracing::warn!("stored password hash is malformed");
            return false;
        };
        self.argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    }
}

impl Default for PasswordHashing {
    fn default() -> Self {
        PasswordHashing { argon2: Argon2::default() }
    }
}
