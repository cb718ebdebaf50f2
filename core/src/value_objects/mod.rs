//! Validated value objects shared by the write side.

mod email;
mod password;

pub use email::Email;
pub use password::{MIN_PASSWORD_LENGTH, PasswordHash, PasswordHashError, PasswordPolicyViolation};
