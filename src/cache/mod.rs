//! List Cache: membership lists derived from the credential table and the
//! table registry, refreshed explicitly after each mutation.

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::load_tokens;
use crate::config::AuthConfig;
use crate::database::{DatabaseError, TableRepository, User, UserRepository};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSnapshot {
    pub users: Vec<String>,
    pub active: Vec<String>,
    pub deleted: Vec<String>,
    /// Active admins only
    pub admins: Vec<String>,
    pub tables: Vec<String>,
    pub deleted_tables: Vec<String>,
}

impl CacheSnapshot {
    pub fn build(users: &[User], tables: Vec<String>, deleted_tables: Vec<String>) -> Self {
        let mut snapshot = Self {
            tables,
            deleted_tables,
            ..Self::default()
        };
        for user in users {
            snapshot.users.push(user.username.clone());
            if user.is_active() {
                snapshot.active.push(user.username.clone());
                if user.admin {
                    snapshot.admins.push(user.username.clone());
                }
            } else {
                snapshot.deleted.push(user.username.clone());
            }
        }
        snapshot
    }
}

#[derive(Debug, Default)]
pub struct ListCache {
    snapshot: RwLock<CacheSnapshot>,
    tokens: RwLock<Vec<String>>,
}

impl ListCache {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            snapshot: RwLock::new(CacheSnapshot::default()),
            tokens: RwLock::new(tokens),
        }
    }

    /// Re-derive every list from the database and swap the snapshot in
    pub async fn refresh(&self, users: &UserRepository, tables: &TableRepository) -> Result<(), DatabaseError> {
        let all_users = users.list().await?;
        let live = tables.list_live().await?;
        let deleted = tables.list_deleted().await?;

        let snapshot = CacheSnapshot::build(&all_users, live, deleted);
        debug!(
            users = snapshot.users.len(),
            admins = snapshot.admins.len(),
            tables = snapshot.tables.len(),
            "list cache refreshed"
        );
        *self.snapshot.write().await = snapshot;
        Ok(())
    }

    pub async fn reload_tokens(&self, config: &AuthConfig) -> std::io::Result<usize> {
        let tokens = load_tokens(config).await?;
        let count = tokens.len();
        *self.tokens.write().await = tokens;
        Ok(count)
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn active(&self) -> Vec<String> {
        self.snapshot.read().await.active.clone()
    }

    pub async fn deleted(&self) -> Vec<String> {
        self.snapshot.read().await.deleted.clone()
    }

    pub async fn admins(&self) -> Vec<String> {
        self.snapshot.read().await.admins.clone()
    }

    pub async fn tables(&self) -> Vec<String> {
        self.snapshot.read().await.tables.clone()
    }

    pub async fn deleted_tables(&self) -> Vec<String> {
        self.snapshot.read().await.deleted_tables.clone()
    }

    pub async fn is_admin(&self, username: &str) -> bool {
        self.snapshot.read().await.admins.iter().any(|u| u == username)
    }

    pub async fn has_token(&self, token: &str) -> bool {
        !token.is_empty() && self.tokens.read().await.iter().any(|t| t == token)
    }
}
