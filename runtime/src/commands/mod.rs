//! Write-path command handlers.

mod authenticate;
mod create_user;

pub use authenticate::{AuthenticateCommand, AuthenticateHandler, DEFAULT_SESSION_TTL_SECS};
pub use create_user::{CreateUserCommand, CreateUserHandler};
