//! Normalized email address.

use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

#[allow(clippy::expect_used)] // Pattern is a literal; failure is a programming error
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").expect("email pattern compiles")
});

/// An email address, trimmed and lower-cased.
///
/// Two emails that differ only in case or surrounding whitespace compare
/// equal once parsed, which is what tenant-scoped uniqueness relies on.
///
/// # Examples
///
/// ```
/// use tenant_registry_core::value_objects::Email;
///
/// let email = Email::parse("  TEST@EXAMPLE.COM  ").unwrap();
/// assert_eq!(email.as_str(), "test@example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Normalize and validate a raw email address.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEmail`] if the input is empty after
    /// trimming or does not look like `local@domain.tld`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_lowercase();

        if normalized.is_empty() {
            return Err(ValidationError::InvalidEmail(
                "email cannot be empty".to_string(),
            ));
        }

        if !EMAIL_PATTERN.is_match(&normalized) {
            return Err(ValidationError::InvalidEmail(format!(
                "'{normalized}' is not a valid email address"
            )));
        }

        Ok(Self(normalized))
    }

    /// The normalized address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}
