//! Database module for the token gate server
//!
//! This module holds the user record model, the credential-store seam
//! consumed by the session manager, and its Postgres and in-memory backends.

pub mod models;
pub mod operations;
pub mod store;

pub use models::{NewUser, User, UserId};
pub use operations::{DbPoolStatus, PgCredentialStore};
pub use store::{CredentialStore, InMemoryCredentialStore};
