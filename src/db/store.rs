use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::models::{NewUser, User, UserId};
use crate::error::DatabaseError;

/// Durable username -> user mapping consumed by the session manager.
///
/// Implementations must reject a second user with the same username with
/// `DatabaseError::DuplicateUsername`, report absent rows as
/// `DatabaseError::NotFound`, and make a created user visible to the next lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError>;

    async fn get_user_by_username(&self, username: &str) -> Result<User, DatabaseError>;

    async fn get_user_by_id(&self, id: UserId) -> Result<User, DatabaseError>;
}

#[derive(Debug, Default)]
struct Users {
    next_id: UserId,
    by_id: HashMap<UserId, User>,
    by_username: HashMap<String, UserId>,
}

/// Process-local store for tests and single-instance development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    users: Arc<RwLock<Users>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError> {
        let mut users = self.users.write().await;
        if users.by_username.contains_key(&user.username) {
            return Err(DatabaseError::DuplicateUsername);
        }

        users.next_id += 1;
        let user = user.with_id(users.next_id);
        users.by_username.insert(user.username.clone(), user.id);
        users.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, DatabaseError> {
        let users = self.users.read().await;
        users
            .by_username
            .get(username)
            .and_then(|id| users.by_id.get(id))
            .cloned()
            .ok_or(DatabaseError::NotFound)
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<User, DatabaseError> {
        self.users
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or(DatabaseError::NotFound)
    }
}
