//! Credential store: password hashing and verification. Pure functions over
//! the provided strings, no storage access.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use regex::Regex;

use crate::errors::CadreError;

/// Compiled password complexity rule, configured via `auth.password_rule`.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    rule: Regex,
}

impl PasswordPolicy {
    pub fn new(rule: &str) -> Result<Self, CadreError> {
        let rule = Regex::new(rule)
            .map_err(|e| CadreError::Validation(format!("Invalid password rule: {e}")))?;
        Ok(Self { rule })
    }

    pub fn validate(&self, plaintext: &str) -> Result<(), CadreError> {
        if self.rule.is_match(plaintext) {
            Ok(())
        } else {
            Err(CadreError::Validation(
                "Password does not meet the complexity requirements".to_string(),
            ))
        }
    }
}

/// Hash a plaintext password with Argon2id after checking it against the
/// policy. The salt is embedded in the returned PHC string.
pub fn hash_password(policy: &PasswordPolicy, plaintext: &str) -> Result<String, CadreError> {
    policy.validate(plaintext)?;

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| CadreError::Other(format!("Password hashing failed: {e}")))?
        .to_string();
    Ok(hash)
}

/// Constant-time verification. A mismatch returns false, never an error;
/// only a malformed stored hash is reported as an error.
pub fn verify_password(plaintext: &str, hash: &str) -> Result<bool, CadreError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| CadreError::Other(format!("Invalid password hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok())
}
