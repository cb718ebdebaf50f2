//! Validation errors raised by value objects and the `User` aggregate.
//!
//! All of these are client-correctable: they are detected before any side
//! effect takes place.

use crate::value_objects::PasswordPolicyViolation;
use thiserror::Error;

/// Input rejected by domain validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Email is empty or not shaped like `local@domain.tld`.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Password does not satisfy the strength policy.
    #[error("Weak password: {0}")]
    WeakPassword(#[from] PasswordPolicyViolation),

    /// User name is empty.
    #[error("Invalid user name")]
    InvalidUserName,
}
