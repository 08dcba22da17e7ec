//! Table Registry: runtime-defined tables, whole-table soft delete by rename,
//! and row-level soft delete through the `deletedAt` column.

use serde_json::{json, Map, Value};
use sqlx::AnyConnection;
use tracing::{debug, info};

use super::descriptor::{TableDescriptor, CREATED_AT, DELETED_AT, SYSTEM_COLUMNS, UPDATED_AT};
use super::manager::{DatabaseError, DatabaseManager};
use super::row::{bind_all, row_to_json};
use super::users::timestamp;
use crate::filter::types::{RowScope, SqlResult};
use crate::filter::{validate_identifier, Filter};

/// A table name after prefix resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub live: String,
    pub deleted: String,
    /// The caller named the soft-deleted copy explicitly
    pub explicit_deleted: bool,
}

#[derive(Clone)]
pub struct TableRepository {
    db: DatabaseManager,
    protected: String,
    prefix: String,
}

impl TableRepository {
    pub fn new(db: DatabaseManager, protected: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            db,
            protected: protected.into(),
            prefix: prefix.into(),
        }
    }

    /// Reject names that are malformed, protected or carry the soft-delete prefix
    pub fn validate_name(&self, name: &str) -> Result<TableName, DatabaseError> {
        if name.is_empty() {
            return Err(DatabaseError::Validation("Table name is required".to_string()));
        }
        if name.eq_ignore_ascii_case(&self.protected) {
            return Err(DatabaseError::InvalidTableName(format!("Table '{}' is protected", name)));
        }
        if !self.prefix.is_empty() && name.starts_with(&self.prefix) {
            return Err(DatabaseError::InvalidTableName(format!(
                "Table names starting with '{}' are reserved",
                self.prefix
            )));
        }
        let deleted = format!("{}{}", self.prefix, name);
        if !validate_identifier(name) || !validate_identifier(&deleted) {
            return Err(DatabaseError::InvalidTableName(format!("Invalid table name: {}", name)));
        }
        Ok(TableName {
            live: name.to_string(),
            deleted,
            explicit_deleted: false,
        })
    }

    /// Like [`validate_name`](Self::validate_name) but also accepts the prefixed form
    pub fn resolve_name(&self, name: &str) -> Result<TableName, DatabaseError> {
        match name.strip_prefix(&self.prefix) {
            Some(plain) if !self.prefix.is_empty() => {
                let mut resolved = self.validate_name(plain)?;
                resolved.explicit_deleted = true;
                Ok(resolved)
            }
            _ => self.validate_name(name),
        }
    }

    /// User-visible live tables, sorted
    pub async fn list_live(&self) -> Result<Vec<String>, DatabaseError> {
        let mut conn = self.db.pool().acquire().await?;
        let tables = self.db.list_tables(&mut conn).await?;
        Ok(tables
            .into_iter()
            .filter(|t| !t.eq_ignore_ascii_case(&self.protected) && !t.starts_with(&self.prefix))
            .collect())
    }

    /// Soft-deleted tables under their prefixed names, sorted
    pub async fn list_deleted(&self) -> Result<Vec<String>, DatabaseError> {
        if self.prefix.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.db.pool().acquire().await?;
        let tables = self.db.list_tables(&mut conn).await?;
        Ok(tables.into_iter().filter(|t| t.starts_with(&self.prefix)).collect())
    }

    async fn require_live(&self, conn: &mut AnyConnection, name: &str) -> Result<(), DatabaseError> {
        if self.db.table_exists(conn, name).await? {
            Ok(())
        } else {
            Err(DatabaseError::NotFound(format!("Table '{}' not found", name)))
        }
    }

    /// Every key must be an existing, caller-writable column
    async fn check_writable(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        data: &Map<String, Value>,
    ) -> Result<(), DatabaseError> {
        if data.is_empty() {
            return Err(DatabaseError::Validation("Row data must not be empty".to_string()));
        }
        if let Some(system) = data.keys().find(|k| SYSTEM_COLUMNS.contains(&k.as_str())) {
            return Err(DatabaseError::Validation(format!(
                "Column '{}' is managed by the server",
                system
            )));
        }
        self.check_known(conn, table, data).await
    }

    async fn check_known(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        data: &Map<String, Value>,
    ) -> Result<(), DatabaseError> {
        let columns = self.db.table_columns(conn, table).await?;
        match data.keys().find(|k| !columns.iter().any(|c| c == *k)) {
            Some(unknown) => Err(DatabaseError::Validation(format!(
                "Unknown column '{}' in table '{}'",
                unknown, table
            ))),
            None => Ok(()),
        }
    }

    fn where_sql(
        table: &str,
        conditions: Map<String, Value>,
        scope: RowScope,
        starting_param_index: usize,
    ) -> Result<SqlResult, DatabaseError> {
        let mut filter = Filter::new(table)?;
        filter.where_clause(conditions)?.scope(scope);
        Ok(filter.to_where_sql(starting_param_index)?)
    }

    /// `"col" = $n` / `"col" = NULL` assignments for an UPDATE, starting at `$1`
    fn assignments(data: &Map<String, Value>) -> (Vec<String>, Vec<Value>) {
        let mut sets = Vec::with_capacity(data.len());
        let mut params = Vec::new();
        for (column, value) in data {
            let quoted = DatabaseManager::quote_identifier(column);
            if value.is_null() {
                sets.push(format!("{} = NULL", quoted));
            } else {
                params.push(value.clone());
                sets.push(format!("{} = ${}", quoted, params.len()));
            }
        }
        (sets, params)
    }

    async fn insert_row(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        data: &Map<String, Value>,
    ) -> Result<Map<String, Value>, DatabaseError> {
        let now = timestamp();
        let mut columns = vec![
            DatabaseManager::quote_identifier(CREATED_AT),
            DatabaseManager::quote_identifier(UPDATED_AT),
        ];
        let mut placeholders = vec!["$1".to_string(), "$2".to_string()];
        let mut params = vec![Value::String(now.clone()), Value::String(now)];

        for (column, value) in data {
            columns.push(DatabaseManager::quote_identifier(column));
            if value.is_null() {
                placeholders.push("NULL".to_string());
            } else {
                params.push(value.clone());
                placeholders.push(format!("${}", params.len()));
            }
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            DatabaseManager::quote_identifier(table),
            columns.join(", "),
            placeholders.join(", ")
        );
        let row = bind_all(sqlx::query(&sql), &params).fetch_one(&mut *conn).await?;
        Ok(row_to_json(&row))
    }

    pub async fn create(&self, name: &str, descriptor: &TableDescriptor) -> Result<Value, DatabaseError> {
        let table = self.validate_name(name)?;
        let mut tx = self.db.begin().await?;

        if self.db.table_exists(&mut tx, &table.live).await? {
            return Err(DatabaseError::Conflict(format!("Table '{}' already exists", table.live)));
        }
        if self.db.table_exists(&mut tx, &table.deleted).await? {
            return Err(DatabaseError::Conflict(format!(
                "Table '{}' exists as deleted table '{}'; restore or drop it first",
                table.live, table.deleted
            )));
        }

        let sql = descriptor.create_table_sql(&table.live, self.db.dialect());
        sqlx::query(&sql).execute(&mut *tx).await?;

        let row = match descriptor.sample_row() {
            Some(sample) => Some(self.insert_row(&mut tx, &table.live, sample).await?),
            None => None,
        };
        tx.commit().await?;

        info!(table = %table.live, columns = descriptor.columns().len(), "created table");
        Ok(json!({
            "table": table.live,
            "columns": descriptor.columns(),
            "row": row,
        }))
    }

    /// Live rows, optionally narrowed by an equality filter
    pub async fn read(
        &self,
        name: &str,
        filter: Option<Map<String, Value>>,
    ) -> Result<Vec<Map<String, Value>>, DatabaseError> {
        let table = self.validate_name(name)?;
        let mut conn = self.db.pool().acquire().await?;
        self.require_live(&mut conn, &table.live).await?;

        let filtered = filter.as_ref().is_some_and(|f| !f.is_empty());
        let conditions = filter.unwrap_or_default();
        if filtered {
            self.check_known(&mut conn, &table.live, &conditions).await?;
        }

        let mut query = Filter::new(&table.live)?;
        query.where_clause(conditions)?;
        let sql = query.to_sql()?;

        let rows = bind_all(sqlx::query(&sql.query), &sql.params)
            .fetch_all(&mut *conn)
            .await?;
        if filtered && rows.is_empty() {
            return Err(DatabaseError::NotFound(format!("No matching rows in '{}'", table.live)));
        }
        Ok(rows.iter().map(row_to_json).collect())
    }

    pub async fn add(&self, name: &str, data: &Map<String, Value>) -> Result<Map<String, Value>, DatabaseError> {
        let table = self.validate_name(name)?;
        let mut tx = self.db.begin().await?;

        self.require_live(&mut tx, &table.live).await?;
        self.check_writable(&mut tx, &table.live, data).await?;
        let row = self.insert_row(&mut tx, &table.live, data).await?;
        tx.commit().await?;

        debug!(table = %table.live, "added row");
        Ok(row)
    }

    pub async fn update_rows(
        &self,
        name: &str,
        filter: Map<String, Value>,
        data: &Map<String, Value>,
    ) -> Result<Vec<Map<String, Value>>, DatabaseError> {
        let table = self.validate_name(name)?;
        if filter.is_empty() {
            return Err(DatabaseError::Validation("Filter must contain at least one condition".to_string()));
        }
        let mut tx = self.db.begin().await?;

        self.require_live(&mut tx, &table.live).await?;
        self.check_writable(&mut tx, &table.live, data).await?;
        self.check_known(&mut tx, &table.live, &filter).await?;

        let (mut sets, mut params) = Self::assignments(data);
        params.push(Value::String(timestamp()));
        sets.push(format!("{} = ${}", DatabaseManager::quote_identifier(UPDATED_AT), params.len()));

        let where_result = Self::where_sql(&table.live, filter, RowScope::Live, params.len())?;
        params.extend(where_result.params);

        let sql = format!(
            "UPDATE {} SET {} WHERE {} RETURNING *",
            DatabaseManager::quote_identifier(&table.live),
            sets.join(", "),
            where_result.query
        );
        let rows = bind_all(sqlx::query(&sql), &params).fetch_all(&mut *tx).await?;
        if rows.is_empty() {
            return Err(DatabaseError::NotFound(format!("No matching rows in '{}'", table.live)));
        }
        tx.commit().await?;

        debug!(table = %table.live, rows = rows.len(), "updated rows");
        Ok(rows.iter().map(row_to_json).collect())
    }

    /// Add every descriptor column the live table does not have yet
    pub async fn sync_schema(&self, name: &str, descriptor: &TableDescriptor) -> Result<Vec<String>, DatabaseError> {
        let table = self.validate_name(name)?;
        let mut tx = self.db.begin().await?;

        self.require_live(&mut tx, &table.live).await?;
        let existing = self.db.table_columns(&mut tx, &table.live).await?;

        let mut added = Vec::new();
        for column in descriptor.columns() {
            if existing.iter().any(|c| c.eq_ignore_ascii_case(&column.name)) {
                continue;
            }
            let sql = TableDescriptor::add_column_sql(&table.live, column, self.db.dialect());
            sqlx::query(&sql).execute(&mut *tx).await?;
            added.push(column.name.clone());
        }
        tx.commit().await?;

        info!(table = %table.live, added = ?added, "synchronised table schema");
        Ok(added)
    }

    /// Whole-table soft delete: rename to the prefixed name
    pub async fn delete_table(&self, name: &str) -> Result<String, DatabaseError> {
        let table = self.validate_name(name)?;
        let mut tx = self.db.begin().await?;

        self.require_live(&mut tx, &table.live).await?;
        if self.db.table_exists(&mut tx, &table.deleted).await? {
            return Err(DatabaseError::Conflict(format!(
                "Table '{}' already has a deleted copy '{}'",
                table.live, table.deleted
            )));
        }
        self.rename(&mut tx, &table.live, &table.deleted).await?;
        tx.commit().await?;

        info!(table = %table.live, to = %table.deleted, "soft-deleted table");
        Ok(table.deleted)
    }

    /// Whole-table restore: the deleted copy must exist and the live name must be free
    pub async fn restore_table(&self, name: &str) -> Result<String, DatabaseError> {
        let table = self.resolve_name(name)?;
        let mut tx = self.db.begin().await?;

        if !self.db.table_exists(&mut tx, &table.deleted).await? {
            return Err(DatabaseError::NotFound(format!("Deleted table '{}' not found", table.deleted)));
        }
        if self.db.table_exists(&mut tx, &table.live).await? {
            return Err(DatabaseError::Conflict(format!(
                "Cannot restore '{}': table '{}' already exists",
                table.deleted, table.live
            )));
        }
        self.rename(&mut tx, &table.deleted, &table.live).await?;
        tx.commit().await?;

        info!(table = %table.live, from = %table.deleted, "restored table");
        Ok(table.live)
    }

    /// Permanently drop the live table, or its deleted copy when only that exists
    /// or when it was named explicitly
    pub async fn drop_table(&self, name: &str) -> Result<String, DatabaseError> {
        let table = self.resolve_name(name)?;
        let mut tx = self.db.begin().await?;

        let target = if !table.explicit_deleted && self.db.table_exists(&mut tx, &table.live).await? {
            table.live
        } else if self.db.table_exists(&mut tx, &table.deleted).await? {
            table.deleted
        } else {
            return Err(DatabaseError::NotFound(format!("Table '{}' not found", name)));
        };

        let sql = format!("DROP TABLE {}", DatabaseManager::quote_identifier(&target));
        sqlx::query(&sql).execute(&mut *tx).await?;
        tx.commit().await?;

        info!(table = %target, "dropped table");
        Ok(target)
    }

    async fn rename(&self, conn: &mut AnyConnection, from: &str, to: &str) -> Result<(), DatabaseError> {
        let sql = format!(
            "ALTER TABLE {} RENAME TO {}",
            DatabaseManager::quote_identifier(from),
            DatabaseManager::quote_identifier(to)
        );
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }

    /// Row-level soft delete; returns the number of rows marked
    pub async fn delete_rows(&self, name: &str, filter: Map<String, Value>) -> Result<u64, DatabaseError> {
        let now = timestamp();
        let sets = format!(
            "{} = $1, {} = $2",
            DatabaseManager::quote_identifier(DELETED_AT),
            DatabaseManager::quote_identifier(UPDATED_AT)
        );
        self.update_scoped(name, filter, RowScope::Live, &sets, vec![Value::String(now.clone()), Value::String(now)])
            .await
    }

    /// Clear `deletedAt` on matching soft-deleted rows
    pub async fn restore_rows(&self, name: &str, filter: Map<String, Value>) -> Result<u64, DatabaseError> {
        let sets = format!(
            "{} = NULL, {} = $1",
            DatabaseManager::quote_identifier(DELETED_AT),
            DatabaseManager::quote_identifier(UPDATED_AT)
        );
        self.update_scoped(name, filter, RowScope::Deleted, &sets, vec![Value::String(timestamp())])
            .await
    }

    /// Permanently delete matching rows, live or soft-deleted
    pub async fn drop_rows(&self, name: &str, filter: Map<String, Value>) -> Result<u64, DatabaseError> {
        let table = self.validate_name(name)?;
        let mut tx = self.db.begin().await?;
        self.require_row_filter(&mut tx, &table.live, &filter).await?;

        let where_result = Self::where_sql(&table.live, filter, RowScope::All, 0)?;
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            DatabaseManager::quote_identifier(&table.live),
            where_result.query
        );
        let affected = bind_all(sqlx::query(&sql), &where_result.params)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(DatabaseError::NotFound(format!("No matching rows in '{}'", table.live)));
        }
        tx.commit().await?;

        debug!(table = %table.live, rows = affected, "dropped rows");
        Ok(affected)
    }

    async fn require_row_filter(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        filter: &Map<String, Value>,
    ) -> Result<(), DatabaseError> {
        if filter.is_empty() {
            return Err(DatabaseError::Validation("Filter must contain at least one condition".to_string()));
        }
        self.require_live(conn, table).await?;
        self.check_known(conn, table, filter).await
    }

    async fn update_scoped(
        &self,
        name: &str,
        filter: Map<String, Value>,
        scope: RowScope,
        sets: &str,
        mut params: Vec<Value>,
    ) -> Result<u64, DatabaseError> {
        let table = self.validate_name(name)?;
        let mut tx = self.db.begin().await?;
        self.require_row_filter(&mut tx, &table.live, &filter).await?;

        let where_result = Self::where_sql(&table.live, filter, scope, params.len())?;
        params.extend(where_result.params);
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            DatabaseManager::quote_identifier(&table.live),
            sets,
            where_result.query
        );
        let affected = bind_all(sqlx::query(&sql), &params)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(DatabaseError::NotFound(format!("No matching rows in '{}'", table.live)));
        }
        tx.commit().await?;

        debug!(table = %table.live, rows = affected, ?scope, "updated row state");
        Ok(affected)
    }
}
