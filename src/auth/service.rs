use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::auth::password::PasswordHasher;
use crate::auth::revocation::RevocationStore;
use crate::auth::token::{TokenClaims, TokenCodec};
use crate::config::AuthConfig;
use crate::db::models::{NewUser, User};
use crate::db::store::CredentialStore;
use crate::error::{AppError, AuthError, DatabaseError};

pub const MAX_USERNAME_LEN: usize = 64;
/// bcrypt ignores input past this many bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Register, login, validate and revoke over a token's lifetime.
///
/// A token is active until it is revoked or its `exp` passes; both are terminal.
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    revocations: Arc<dyn RevocationStore>,
    hasher: PasswordHasher,
    codec: TokenCodec,
    validity: Duration,
    timeout: std::time::Duration,
    decoy_hash: String,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        revocations: Arc<dyn RevocationStore>,
        hasher: PasswordHasher,
        codec: TokenCodec,
        validity: Duration,
        timeout: std::time::Duration,
    ) -> Result<Self, AppError> {
        if validity <= Duration::zero() {
            return Err(AppError::ConfigError("token validity window must be positive".into()));
        }

        let decoy_hash = hasher.decoy_hash()?;
        Ok(Self {
            store,
            revocations,
            hasher,
            codec,
            validity,
            timeout,
            decoy_hash,
        })
    }

    pub fn from_config(
        config: &AuthConfig,
        store: Arc<dyn CredentialStore>,
        revocations: Arc<dyn RevocationStore>,
    ) -> Result<Self, AppError> {
        Self::new(
            store,
            revocations,
            PasswordHasher::new(config.bcrypt_cost)?,
            TokenCodec::new(config.jwt_secret.as_bytes())?,
            config.token_validity()?,
            config.request_timeout(),
        )
    }

    pub fn revocations(&self) -> Arc<dyn RevocationStore> {
        self.revocations.clone()
    }

    /// Creates the user and issues its first token.
    ///
    /// If issuance fails or times out after the user row is written, the
    /// account exists and the caller recovers with `login`.
    pub async fn register(&self, username: &str, password: &str) -> Result<IssuedToken, AppError> {
        validate_credentials(username, password)?;

        self.bounded(self.create_account(username, password)).await
    }

    /// Unknown usernames and wrong passwords both yield `InvalidCredentials`
    /// after one full bcrypt verification.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AppError> {
        self.bounded(self.authenticate(username, password)).await
    }

    pub async fn validate_token(&self, token: &str) -> Result<TokenClaims, AppError> {
        self.validate_token_at(token, Utc::now()).await
    }

    /// Signature is verified before any claim is trusted; expiry is checked
    /// last so a revoked token reports `Revoked` until its entry is pruned.
    pub async fn validate_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, AppError> {
        let claims = self.codec.decode(token)?;

        let revoked = self
            .bounded(async {
                self.revocations
                    .contains(token, now)
                    .await
                    .map_err(store_failure)
            })
            .await?;
        if revoked {
            debug!("Rejected revoked token {}", claims.jti);
            return Err(AuthError::Revoked.into());
        }

        if claims.is_expired_at(now) {
            debug!("Rejected expired token {}", claims.jti);
            return Err(AuthError::Expired.into());
        }

        Ok(claims)
    }

    /// Idempotent; tokens that fail to decode cannot be revoked.
    pub async fn revoke_token(&self, token: &str) -> Result<(), AppError> {
        let claims = self.codec.decode(token)?;

        self.bounded(async {
            self.revocations
                .add(token, Utc::now(), claims.expires_at())
                .await
                .map_err(store_failure)
        })
        .await?;

        info!("Revoked token {} for user {}", claims.jti, claims.username);
        Ok(())
    }

    /// Resolves the user a valid token was issued to.
    pub async fn current_user(&self, token: &str) -> Result<User, AppError> {
        let claims = self.validate_token(token).await?;

        self.bounded(self.lookup_token_owner(&claims)).await
    }

    async fn create_account(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IssuedToken, AppError> {
        match self.store.get_user_by_username(username).await {
            Ok(_) => {
                warn!("Registration rejected, username taken: {}", username);
                return Err(AuthError::DuplicateUsername.into());
            }
            Err(DatabaseError::NotFound) => {}
            Err(e) => return Err(store_failure(e)),
        }

        let password_hash = self.hash_password(password).await?;
        let user = self
            .store
            .create_user(NewUser::new(username.to_owned(), password_hash))
            .await
            .map_err(store_failure)?;
        info!("Registered user {} (id {})", user.username, user.id);

        self.issue_for(&user, Utc::now())
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<IssuedToken, AppError> {
        let user = match self.store.get_user_by_username(username).await {
            Ok(user) => Some(user),
            Err(DatabaseError::NotFound) => None,
            Err(e) => return Err(store_failure(e)),
        };

        let hash = user
            .as_ref()
            .map_or_else(|| self.decoy_hash.clone(), |u| u.password_hash.clone());
        let verified = self.verify_password(hash, password).await?;

        match user {
            Some(user) if verified => {
                info!("Login successful for user {}", user.username);
                self.issue_for(&user, Utc::now())
            }
            _ => {
                warn!("Login failed for username {}", username);
                Err(AuthError::InvalidCredentials.into())
            }
        }
    }

    async fn lookup_token_owner(&self, claims: &TokenClaims) -> Result<User, AppError> {
        match self.store.get_user_by_id(claims.user_id).await {
            Ok(user) => Ok(user),
            Err(DatabaseError::NotFound) => {
                warn!("Token {} refers to missing user {}", claims.jti, claims.user_id);
                Err(AuthError::InvalidCredentials.into())
            }
            Err(e) => Err(store_failure(e)),
        }
    }

    fn issue_for(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedToken, AppError> {
        let claims = TokenClaims::for_user(user, now, self.validity)?;
        let token = self.codec.issue(&claims)?;

        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at(),
        })
    }

    async fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let hasher = self.hasher;
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::InternalError(format!("hashing task failed: {}", e)))?
    }

    async fn verify_password(&self, hash: String, password: &str) -> Result<bool, AppError> {
        let hasher = self.hasher;
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&hash, &password))
            .await
            .map_err(|e| AppError::InternalError(format!("verification task failed: {}", e)))?
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(elapsed) => {
                error!("Operation exceeded {:?}", self.timeout);
                Err(AuthError::from(elapsed).into())
            }
        }
    }
}

fn store_failure(err: DatabaseError) -> AppError {
    let err = AuthError::from(err);
    if err.is_transient() {
        error!("Credential store failure: {}", err);
    }
    err.into()
}

fn validate_credentials(username: &str, password: &str) -> Result<(), AppError> {
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::ValidationError(format!(
            "username must be 1 to {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if username.trim() != username {
        return Err(AppError::ValidationError(
            "username must not start or end with whitespace".into(),
        ));
    }
    if password.is_empty() || password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::ValidationError(format!(
            "password must be 1 to {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}
