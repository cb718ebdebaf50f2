//! Password strength policy and irreversible hashing.

use argon2::{
    Argon2,
    password_hash::{self, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::fmt;
use thiserror::Error;

/// Minimum number of characters in a plaintext password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// The first rule a plaintext password breaks.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPolicyViolation {
    /// Fewer than [`MIN_PASSWORD_LENGTH`] characters.
    #[error("password must be at least {min} characters long")]
    TooShort {
        /// Required minimum length
        min: usize,
    },

    /// No uppercase letter.
    #[error("password must contain at least one uppercase letter")]
    MissingUppercase,

    /// No lowercase letter.
    #[error("password must contain at least one lowercase letter")]
    MissingLowercase,

    /// No digit.
    #[error("password must contain at least one number")]
    MissingDigit,

    /// No punctuation or symbol character.
    #[error("password must contain at least one special character")]
    MissingSymbol,
}

/// Hashing itself failed (not a policy problem).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Password hashing failed: {0}")]
pub struct PasswordHashError(String);

impl From<password_hash::Error> for PasswordHashError {
    fn from(value: password_hash::Error) -> Self {
        Self(value.to_string())
    }
}

/// An Argon2id password hash in PHC string format.
///
/// The plaintext never leaves [`PasswordHash::hash`]; only the salted hash is
/// kept, and `Debug` redacts even that.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Check the strength policy without hashing.
    ///
    /// Rules are checked in order: length, uppercase, lowercase, digit, symbol.
    ///
    /// # Errors
    ///
    /// Returns the first [`PasswordPolicyViolation`] encountered.
    pub fn validate(plain: &str) -> Result<(), PasswordPolicyViolation> {
        if plain.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(PasswordPolicyViolation::TooShort {
                min: MIN_PASSWORD_LENGTH,
            });
        }

        let mut has_upper = false;
        let mut has_lower = false;
        let mut has_digit = false;
        let mut has_symbol = false;

        for c in plain.chars() {
            if c.is_uppercase() {
                has_upper = true;
            } else if c.is_lowercase() {
                has_lower = true;
            } else if c.is_numeric() {
                has_digit = true;
            } else if !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control() {
                has_symbol = true;
            }
        }

        if !has_upper {
            return Err(PasswordPolicyViolation::MissingUppercase);
        }
        if !has_lower {
            return Err(PasswordPolicyViolation::MissingLowercase);
        }
        if !has_digit {
            return Err(PasswordPolicyViolation::MissingDigit);
        }
        if !has_symbol {
            return Err(PasswordPolicyViolation::MissingSymbol);
        }

        Ok(())
    }

    /// Hash a plaintext password with a fresh random salt.
    ///
    /// Callers validate first with [`PasswordHash::validate`]; this function
    /// hashes whatever it is given.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordHashError`] if Argon2 rejects its parameters.
    pub fn hash(plain: &str) -> Result<Self, PasswordHashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)?
            .to_string();
        Ok(Self(hash))
    }

    /// Rebuild from a stored PHC string.
    #[must_use]
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// The PHC string, suitable for storage.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify a plaintext candidate against this hash.
    ///
    /// A malformed stored hash never verifies.
    #[must_use]
    pub fn verify(&self, plain: &str) -> bool {
        let Ok(parsed) = password_hash::PasswordHash::new(&self.0) else {
            tracing::warn!("Stored password hash is not a valid PHC string");
            return false;
        };
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn too_short_is_rejected_first() {
        assert_eq!(
            PasswordHash::validate("Short1!"),
            Err(PasswordPolicyViolation::TooShort { min: 8 })
        );
    }

    #[test]
    fn missing_uppercase() {
        assert_eq!(
            PasswordHash::validate("lowercase123!"),
            Err(PasswordPolicyViolation::MissingUppercase)
        );
    }

    #[test]
    fn missing_lowercase() {
        assert_eq!(
            PasswordHash::validate("NOUPPERCASE123!"),
            Err(PasswordPolicyViolation::MissingLowercase)
        );
    }

    #[test]
    fn missing_digit() {
        assert_eq!(
            PasswordHash::validate("NoNumbers!"),
            Err(PasswordPolicyViolation::MissingDigit)
        );
    }

    #[test]
    fn missing_symbol() {
        assert_eq!(
            PasswordHash::validate("NoSpecial123"),
            Err(PasswordPolicyViolation::MissingSymbol)
        );
    }

    #[test]
    fn strong_password_hashes_and_verifies() {
        let plain = "SecurePass123!";
        assert_eq!(PasswordHash::validate(plain), Ok(()));

        let hash = PasswordHash::hash(plain).unwrap();
        assert_ne!(hash.as_str(), plain);
        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(hash.verify(plain));
        assert!(!hash.verify("WrongPassword!"));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = PasswordHash::hash("SecurePass123!").unwrap();
        let b = PasswordHash::hash("SecurePass123!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rebuilt_hash_still_verifies() {
        let original = PasswordHash::hash("SecurePass123!").unwrap();
        let rebuilt = PasswordHash::from_hash(original.as_str());
        assert!(rebuilt.verify("SecurePass123!"));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!PasswordHash::from_hash("$2a$10$...").verify("SecurePass123!"));
    }

    #[test]
    fn debug_is_redacted() {
        let hash = PasswordHash::hash("SecurePass123!").unwrap();
        assert_eq!(format!("{hash:?}"), "PasswordHash(<redacted>)");
    }
}
