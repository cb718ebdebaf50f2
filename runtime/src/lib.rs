//! # Tenant Registry Runtime
//!
//! Application layer of the registry: the command handlers that drive the
//! write path and the query handlers that serve the read model.
//!
//! ## Components
//!
//! - **`CreateUserHandler`**: idempotency check → validation → persistence →
//!   `user.created` publish
//! - **`AuthenticateHandler`**: credential verification, issues a `Session`
//! - **`UserQueries`**: `GetUser` / `ListUsers` over projected views
//!
//! Handlers are generic over the store traits in `tenant_registry_core` and
//! hold the publisher as `Arc<dyn EventPublisher>`, so the same code runs
//! against PostgreSQL and Redpanda in production and against the in-memory
//! doubles of `tenant_registry_testing` in tests.
//!
//! ## Example
//!
//! ```ignore
//! use tenant_registry_runtime::commands::{CreateUserCommand, CreateUserHandler};
//!
//! let handler = CreateUserHandler::new(users, idempotency, publisher);
//!
//! match handler.handle(command).await {
//!     Ok(user_id) => println!("created {user_id}"),
//!     Err(e) if e.created_user_id().is_some() => println!("created, projection lagging"),
//!     Err(e) if e.is_client_error() => println!("rejected: {e}"),
//!     Err(e) => println!("failed: {e}"),
//! }
//! ```

pub mod commands;
pub mod error;
pub mod queries;

pub use commands::{AuthenticateCommand, AuthenticateHandler, CreateUserCommand, CreateUserHandler};
pub use error::{AuthenticateError, CreateUserError, ErrorKind, QueryError};
pub use queries::{GetUser, ListUsers, UserQueries};
