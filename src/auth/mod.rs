//! Authentication module for the token gate server
//!
//! Password hashing, signed session tokens, revocation tracking and the
//! session manager that composes them, plus the thin HTTP handlers on top.

pub mod handlers;
mod password;
mod revocation;
mod service;
mod token;

pub use password::{PasswordHasher, MAX_BCRYPT_COST, MIN_BCRYPT_COST};
pub use revocation::{
    spawn_revocation_sweeper, InMemoryRevocationCache, PgRevocationStore, RevocationStore,
    RevokedTokenRecord,
};
pub use service::{IssuedToken, SessionManager, MAX_PASSWORD_BYTES, MAX_USERNAME_LEN};
pub use token::{TokenClaims, TokenCodec};
