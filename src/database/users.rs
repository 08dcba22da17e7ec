//! Credential Store: the protected user table.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Row};
use tracing::debug;

use super::descriptor::{CREATED_AT, DELETED_AT, UPDATED_AT};
use super::manager::{DatabaseError, DatabaseManager};
use crate::filter::validate_identifier;

/// One account. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub admin: bool,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(rename = "deletedAt")]
    pub deleted_at: Option<String>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    fn from_row(row: &AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password: row.try_get("password")?,
            admin: row.try_get::<i64, _>("admin")? != 0,
            created_at: row.try_get(CREATED_AT)?,
            updated_at: row.try_get(UPDATED_AT)?,
            // The Any driver refuses to decode NULL even into an Option
            deleted_at: row.try_get::<String, _>(DELETED_AT).ok(),
        })
    }
}

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone)]
pub struct UserRepository {
    db: DatabaseManager,
    table: String,
}

impl UserRepository {
    pub fn new(db: DatabaseManager, table: impl Into<String>) -> Result<Self, DatabaseError> {
        let table = table.into();
        if !validate_identifier(&table) {
            return Err(DatabaseError::InvalidTableName(format!(
                "Invalid credential table name: {}",
                table
            )));
        }
        Ok(Self { db, table })
    }

    fn quoted(&self) -> String {
        DatabaseManager::quote_identifier(&self.table)
    }

    /// Create the credential table when it is missing
    pub async fn ensure_table(&self) -> Result<(), DatabaseError> {
        let dialect = self.db.dialect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {},\n    \"username\" VARCHAR(255) NOT NULL UNIQUE,\n    \"password\" TEXT NOT NULL,\n    \"admin\" {} NOT NULL DEFAULT 0,\n    \"{}\" TEXT NOT NULL,\n    \"{}\" TEXT NOT NULL,\n    \"{}\" TEXT\n)",
            self.quoted(),
            dialect.primary_key_sql(),
            dialect.integer_type(),
            CREATED_AT,
            UPDATED_AT,
            DELETED_AT,
        );
        sqlx::query(&sql).execute(self.db.pool()).await?;
        Ok(())
    }

    async fn find_in(&self, conn: &mut AnyConnection, username: &str) -> Result<Option<User>, DatabaseError> {
        let sql = format!("SELECT * FROM {} WHERE \"username\" = $1", self.quoted());
        let row = sqlx::query(&sql)
            .bind(username.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(User::from_row).transpose()?)
    }

    async fn require_in(&self, conn: &mut AnyConnection, username: &str) -> Result<User, DatabaseError> {
        self.find_in(conn, username)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User '{}' not found", username)))
    }

    /// Active or soft-deleted user by name
    pub async fn find(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let mut conn = self.db.pool().acquire().await?;
        self.find_in(&mut conn, username).await
    }

    pub async fn list(&self) -> Result<Vec<User>, DatabaseError> {
        let sql = format!("SELECT * FROM {} ORDER BY \"username\"", self.quoted());
        let rows = sqlx::query(&sql).fetch_all(self.db.pool()).await?;
        Ok(rows.iter().map(User::from_row).collect::<Result<_, _>>()?)
    }

    pub async fn has_active_admin(&self) -> Result<bool, DatabaseError> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {} WHERE \"admin\" <> 0 AND \"{}\" IS NULL",
            self.quoted(),
            DELETED_AT
        );
        let count: i64 = sqlx::query(&sql).fetch_one(self.db.pool()).await?.try_get("count")?;
        Ok(count > 0)
    }

    pub async fn create(&self, username: &str, password_hash: &str, admin: bool) -> Result<User, DatabaseError> {
        if username.trim().is_empty() {
            return Err(DatabaseError::Validation("Username must not be empty".to_string()));
        }

        let mut tx = self.db.begin().await?;

        if let Some(existing) = self.find_in(&mut tx, username).await? {
            let state = if existing.is_active() { "exists" } else { "exists as a deleted user" };
            return Err(DatabaseError::Conflict(format!("User '{}' already {}", username, state)));
        }

        let now = timestamp();
        let sql = format!(
            "INSERT INTO {} (\"username\", \"password\", \"admin\", \"{}\", \"{}\") VALUES ($1, $2, $3, $4, $5)",
            self.quoted(),
            CREATED_AT,
            UPDATED_AT
        );
        sqlx::query(&sql)
            .bind(username.to_string())
            .bind(password_hash.to_string())
            .bind(i64::from(admin))
            .bind(now.clone())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let user = self.require_in(&mut tx, username).await?;
        tx.commit().await?;

        debug!(user = username, admin, "created user");
        Ok(user)
    }

    /// Change the password hash and/or admin flag of an active user
    pub async fn update(
        &self,
        username: &str,
        password_hash: Option<&str>,
        admin: Option<bool>,
    ) -> Result<User, DatabaseError> {
        let mut tx = self.db.begin().await?;

        let user = self.require_in(&mut tx, username).await?;
        if !user.is_active() {
            return Err(DatabaseError::NotFound(format!("User '{}' is deleted", username)));
        }

        let sql = format!(
            "UPDATE {} SET \"password\" = $1, \"admin\" = $2, \"{}\" = $3 WHERE \"username\" = $4",
            self.quoted(),
            UPDATED_AT
        );
        sqlx::query(&sql)
            .bind(password_hash.unwrap_or(&user.password).to_string())
            .bind(i64::from(admin.unwrap_or(user.admin)))
            .bind(timestamp())
            .bind(username.to_string())
            .execute(&mut *tx)
            .await?;

        let user = self.require_in(&mut tx, username).await?;
        tx.commit().await?;

        debug!(user = username, "updated user");
        Ok(user)
    }

    pub async fn soft_delete(&self, username: &str) -> Result<User, DatabaseError> {
        let mut tx = self.db.begin().await?;

        let user = self.require_in(&mut tx, username).await?;
        if !user.is_active() {
            return Err(DatabaseError::Conflict(format!("User '{}' already deleted", username)));
        }

        let now = timestamp();
        let sql = format!(
            "UPDATE {} SET \"{}\" = $1, \"{}\" = $2 WHERE \"username\" = $3",
            self.quoted(),
            DELETED_AT,
            UPDATED_AT
        );
        sqlx::query(&sql)
            .bind(now.clone())
            .bind(now)
            .bind(username.to_string())
            .execute(&mut *tx)
            .await?;

        let user = self.require_in(&mut tx, username).await?;
        tx.commit().await?;

        debug!(user = username, "soft-deleted user");
        Ok(user)
    }

    pub async fn restore(&self, username: &str) -> Result<User, DatabaseError> {
        let mut tx = self.db.begin().await?;

        let user = self.require_in(&mut tx, username).await?;
        if user.is_active() {
            return Err(DatabaseError::Conflict(format!("User '{}' is not deleted", username)));
        }

        let sql = format!(
            "UPDATE {} SET \"{}\" = NULL, \"{}\" = $1 WHERE \"username\" = $2",
            self.quoted(),
            DELETED_AT,
            UPDATED_AT
        );
        sqlx::query(&sql)
            .bind(timestamp())
            .bind(username.to_string())
            .execute(&mut *tx)
            .await?;

        let user = self.require_in(&mut tx, username).await?;
        tx.commit().await?;

        debug!(user = username, "restored user");
        Ok(user)
    }

    /// Permanently remove the row, whatever its state
    pub async fn drop(&self, username: &str) -> Result<User, DatabaseError> {
        let mut tx = self.db.begin().await?;

        let user = self.require_in(&mut tx, username).await?;
        let sql = format!("DELETE FROM {} WHERE \"username\" = $1", self.quoted());
        sqlx::query(&sql)
            .bind(username.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(user = username, "dropped user");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialized_view_hides_password() {
        let user = User {
            id: 7,
            username: "bob".into(),
            password: "$argon2id$secret".into(),
            admin: true,
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-01T00:00:00.000Z".into(),
            deleted_at: None,
        };
        let view = serde_json::to_value(&user).unwrap();
        assert_eq!(
            view,
            json!({
                "username": "bob",
                "admin": true,
                "createdAt": "2024-01-01T00:00:00.000Z",
                "updatedAt": "2024-01-01T00:00:00.000Z",
                "deletedAt": null
            })
        );
    }

    async fn memory_repository() -> UserRepository {
        let mut config = crate::config::AppConfig::default().database;
        config.storage = ":memory:".to_string();
        let db = DatabaseManager::connect(&config).await.unwrap();
        let users = UserRepository::new(db, "users").unwrap();
        users.ensure_table().await.unwrap();
        users
    }

    #[tokio::test]
    async fn rows_decode_through_the_lifecycle() {
        let users = memory_repository().await;

        let created = users.create("alice", "hash", false).await.unwrap();
        assert_eq!(created.username, "alice");
        assert!(!created.admin);
        assert!(created.is_active());

        let found = users.find("alice").await.unwrap().unwrap();
        assert_eq!(found.password, "hash");
        assert_eq!(found.deleted_at, None);

        let deleted = users.soft_delete("alice").await.unwrap();
        assert!(deleted.deleted_at.is_some());
        assert!(!users.find("alice").await.unwrap().unwrap().is_active());

        let restored = users.restore("alice").await.unwrap();
        assert!(restored.is_active());

        users.drop("alice").await.unwrap();
        assert!(users.find("alice").await.unwrap().is_none());
    }

    #[test]
    fn timestamps_are_rfc3339_utc() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
