use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedTokenRecord {
    pub revoked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RevokedTokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Tokens invalidated before their natural expiry.
///
/// Entries whose `expires_at` has passed carry no information (the token is
/// rejected as expired anyway) and may be dropped at any time.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Records a revocation. Revoking an already revoked token is a no-op.
    async fn add(
        &self,
        token: &str,
        revoked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn contains(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError>;

    /// Drops entries expired at `now`, returning how many were removed.
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError>;

    async fn len(&self) -> Result<usize, DatabaseError>;
}

/// Process-local revocation set guarded by a single `RwLock`.
///
/// `add` holds the write lock for the whole insert, so a concurrent `contains`
/// observes the token either absent or fully recorded.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRevocationCache {
    entries: Arc<RwLock<HashMap<String, RevokedTokenRecord>>>,
}

impl InMemoryRevocationCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationCache {
    async fn add(
        &self,
        token: &str,
        revoked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut entries = self.entries.write().await;

        // Bounds the map to revocations that still matter.
        entries.retain(|_, record| !record.is_expired_at(revoked_at));

        if expires_at > revoked_at {
            entries
                .entry(token.to_owned())
                .or_insert(RevokedTokenRecord { revoked_at, expires_at });
        }
        Ok(())
    }

    async fn contains(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(token)
            .is_some_and(|record| !record.is_expired_at(now)))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, record| !record.is_expired_at(now));
        Ok(before - entries.len())
    }

    async fn len(&self) -> Result<usize, DatabaseError> {
        Ok(self.entries.read().await.len())
    }
}

/// Revocations shared by every instance through the `revoked_tokens` table.
///
/// Rows are keyed by the SHA-256 digest of the token; raw tokens are never stored.
pub struct PgRevocationStore {
    pool: Arc<PgPool>,
}

impl PgRevocationStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn digest(token: &str) -> String {
        format!("{:x}", Sha256::digest(token.as_bytes()))
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn add(
        &self,
        token: &str,
        revoked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_digest, revoked_at, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_digest) DO NOTHING
            "#,
        )
        .bind(Self::digest(token))
        .bind(revoked_at)
        .bind(expires_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn contains(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM revoked_tokens WHERE token_digest = $1 AND expires_at > $2",
        )
        .bind(Self::digest(token))
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(found.is_some())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn len(&self) -> Result<usize, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM revoked_tokens")
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count as usize)
    }
}

/// Periodically prunes expired revocations until the returned handle is aborted.
pub fn spawn_revocation_sweeper(
    store: Arc<dyn RevocationStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.prune_expired(Utc::now()).await {
                Ok(0) => debug!("Revocation sweep found nothing to prune"),
                Ok(pruned) => info!("Pruned {} expired revocation entries", pruned),
                Err(e) => warn!("Revocation sweep failed: {}", e),
            }
        }
    })
}
