//! Password hashing using Argon2id
//!
//! # Example
//!
//! ```rust
//! use tourbook::auth::PasswordHasher;
//! use tourbook::config::PasswordConfig;
//!
//! let hasher = PasswordHasher::new(&PasswordConfig::default()).unwrap();
//! let hash = hasher.hash("pass1234").unwrap();
//! assert!(hasher.verify("pass1234", &hash).unwrap());
//! assert!(!hasher.verify("pass12345", &hash).unwrap());
//! ```

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as Argon2Hasher, PasswordVerifier,
        SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

use crate::config::PasswordConfig;
use crate::error::{Error, Result};
use crate::model::{FieldError, ValidationErrors};

/// Password hasher using Argon2id
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    min_length: usize,
}

impl PasswordHasher {
    /// Build a hasher from configured parameters
    pub fn new(config: &PasswordConfig) -> Result<Self> {
        let params = Params::new(config.memory_cost_kib, config.time_cost, config.parallelism, None)
            .map_err(|e| Error::Password(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Self {
            params,
            min_length: config.min_length,
        })
    }

    /// Hash a password into a PHC string
    pub fn hash(&self, password: &str) -> Result<String> {
        if password.chars().count() < self.min_length {
            let errors: ValidationErrors = vec![FieldError::new(
                "password",
                format!("Password must be at least {} characters", self.min_length),
            )]
            .into();
            return Err(errors.into());
        }

        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let hash = argon2.hash_password(password.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    /// Check `password` against a PHC hash in constant time
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// [`hash`](Self::hash) on the blocking thread pool
    pub async fn hash_blocking(&self, password: String) -> Result<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| Error::Internal(format!("Password hashing task failed: {}", e)))?
    }

    /// [`verify`](Self::verify) on the blocking thread pool
    pub async fn verify_blocking(&self, password: String, hash: String) -> Result<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| Error::Internal(format!("Password verification task failed: {}", e)))?
    }

    /// Whether `hash` was produced with other parameters than ours
    pub fn needs_rehash(&self, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return true;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident() || parsed.version != Some(19) {
            return true;
        }
        let param = |name: &str| {
            parsed
                .params
                .iter()
                .find(|(k, _)| k.as_str() == name)
                .and_then(|(_, v)| v.decimal().ok())
        };
        param("m") != Some(self.params.m_cost())
            || param("t") != Some(self.params.t_cost())
            || param("p") != Some(self.params.p_cost())
    }

    /// Minimum accepted password length
    pub fn min_length(&self) -> usize {
        self.min_length
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("min_length", &self.min_length)
            .finish()
    }
}
