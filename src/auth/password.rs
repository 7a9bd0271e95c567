use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::AppError;

/// Cost bounds accepted by bcrypt.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// Salted adaptive password hashing backed by bcrypt.
///
/// Each increment of `cost` doubles the work per hash.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, AppError> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
            return Err(AppError::ConfigError(format!("invalid bcrypt cost: {}", cost)));
        }
        Ok(Self { cost })
    }

    pub fn hash(&self, plaintext: &str) -> Result<String, AppError> {
        bcrypt::hash(plaintext, self.cost)
            .map_err(|e| AppError::InternalError(format!("password hashing failed: {}", e)))
    }

    /// `Ok(false)` on mismatch; errors only when `hash` is not a bcrypt hash.
    pub fn verify(&self, hash: &str, plaintext: &str) -> Result<bool, AppError> {
        bcrypt::verify(plaintext, hash).map_err(|e| {
            AppError::InternalError(format!("stored password hash is malformed: {}", e))
        })
    }

    /// Hash of a random password at this cost, verified against when a username
    /// is unknown so both login failure paths take the same time.
    pub fn decoy_hash(&self) -> Result<String, AppError> {
        let filler: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        self.hash(&filler)
    }
}
