use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{User, UserId};
use crate::error::{AppError, AuthError};

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub username: String,
    pub iat: i64,  // Issued at
    pub exp: i64,  // Expiration time
    pub jti: Uuid, // Distinguishes tokens issued in the same second
}

impl TokenClaims {
    /// Claims for `user` valid from `issued_at` for `validity`.
    pub fn for_user(
        user: &User,
        issued_at: DateTime<Utc>,
        validity: Duration,
    ) -> Result<Self, AppError> {
        let expires_at = issued_at.checked_add_signed(validity).ok_or_else(|| {
            AppError::ConfigError(format!("token validity {} overflows expiry", validity))
        })?;

        Ok(Self {
            user_id: user.id,
            username: user.username.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        })
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Signs claims into HS256 JWTs and verifies them back.
///
/// Decoding checks signature, algorithm and structure only; expiry and
/// revocation policy live in the session manager.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(AppError::ConfigError("token signing secret is empty".into()));
        }

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    pub fn issue(&self, claims: &TokenClaims) -> Result<String, AppError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| AppError::InternalError(format!("token signing failed: {}", e)))
    }

    pub fn decode(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}
