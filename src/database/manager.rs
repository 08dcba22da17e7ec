use serde_json::{Map, Value};
use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::{AnyConnection, AnyPool, ConnectOptions, Row, Transaction};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

use super::descriptor::DescriptorError;
use super::dialect::Dialect;
use super::row::row_to_json;
use crate::config::{DatabaseConfig, DialectKind};
use crate::filter::FilterError;

/// Errors from the storage layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),

    #[error("{0}")]
    InvalidTableName(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connection pool plus the dialect it speaks
#[derive(Clone)]
pub struct DatabaseManager {
    pool: AnyPool,
    dialect: Dialect,
}

impl DatabaseManager {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        sqlx::any::install_default_drivers();

        let url = Self::connection_url(config)?;
        let mut options = AnyConnectOptions::from_str(&url)
            .map_err(|e| DatabaseError::InvalidDatabaseUrl(e.to_string()))?;
        if !config.enable_query_logging {
            options = options.disable_statement_logging();
        }

        // Every connection to `:memory:` opens its own database, so the pool
        // must hold exactly one connection and never recycle it
        let pool_options = if Self::is_memory(config) {
            AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new().max_connections(config.max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        let dialect = Dialect::from(config.dialect);

        info!("Connected to {:?} database", dialect);
        Ok(Self { pool, dialect })
    }

    fn is_memory(config: &DatabaseConfig) -> bool {
        match config.url.as_deref() {
            Some(url) => url.contains(":memory:") || url.contains("mode=memory"),
            None => config.dialect == DialectKind::Sqlite && config.storage == ":memory:",
        }
    }

    /// `DATABASE_URL` when set, otherwise assembled from the individual fields
    fn connection_url(config: &DatabaseConfig) -> Result<String, DatabaseError> {
        if let Some(url) = &config.url {
            return Ok(url.clone());
        }

        match config.dialect {
            DialectKind::Sqlite if config.storage == ":memory:" => Ok("sqlite::memory:".to_string()),
            DialectKind::Sqlite => Ok(format!("sqlite://{}?mode=rwc", config.storage)),
            DialectKind::Postgres => {
                let base = format!("postgres://{}:{}", config.host, config.port);
                let mut url =
                    url::Url::parse(&base).map_err(|e| DatabaseError::InvalidDatabaseUrl(e.to_string()))?;
                if let Some(username) = &config.username {
                    url.set_username(username)
                        .map_err(|_| DatabaseError::InvalidDatabaseUrl("cannot set username".to_string()))?;
                }
                if let Some(password) = &config.password {
                    url.set_password(Some(password))
                        .map_err(|_| DatabaseError::InvalidDatabaseUrl("cannot set password".to_string()))?;
                }
                url.set_path(&format!("/{}", config.database));
                Ok(url.into())
            }
        }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub async fn begin(&self) -> Result<Transaction<'static, sqlx::Any>, DatabaseError> {
        Ok(self.pool.begin().await?)
    }

    /// Quote SQL identifier to prevent injection
    pub fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Base tables in the current schema, sorted by name
    pub async fn list_tables(&self, conn: &mut AnyConnection) -> Result<Vec<String>, DatabaseError> {
        let rows = sqlx::query(self.dialect.list_tables_sql()).fetch_all(&mut *conn).await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get::<String, _>("name")?);
        }
        Ok(names)
    }

    pub async fn table_exists(&self, conn: &mut AnyConnection, name: &str) -> Result<bool, DatabaseError> {
        Ok(self.list_tables(conn).await?.iter().any(|t| t == name))
    }

    pub async fn table_columns(
        &self,
        conn: &mut AnyConnection,
        name: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        let rows = sqlx::query(self.dialect.list_columns_sql())
            .bind(name.to_string())
            .fetch_all(&mut *conn)
            .await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(row.try_get::<String, _>("name")?);
        }
        Ok(columns)
    }

    /// Execute caller-supplied SQL verbatim inside a transaction and return any rows it yields
    pub async fn raw_query(&self, sql: &str) -> Result<Vec<Map<String, Value>>, DatabaseError> {
        let mut tx = self.begin().await?;
        let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}
