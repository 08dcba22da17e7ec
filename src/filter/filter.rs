use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_where::FilterWhere;
use super::types::{RowScope, SqlResult};
use crate::database::DatabaseManager;

/// Longest identifier both supported dialects accept (Postgres truncates at 63 bytes)
const MAX_IDENTIFIER_LEN: usize = 63;

/// `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes
pub fn validate_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Row selection over a single table: equality/operator conditions plus a soft-delete scope
pub struct Filter {
    table_name: String,
    where_data: Map<String, Value>,
    scope: RowScope,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        if !validate_identifier(&table_name) {
            return Err(FilterError::InvalidTableName(table_name));
        }
        Ok(Self {
            table_name,
            where_data: Map::new(),
            scope: RowScope::default(),
        })
    }

    pub fn where_clause(&mut self, conditions: Map<String, Value>) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = conditions;
        Ok(self)
    }

    pub fn scope(&mut self, scope: RowScope) -> &mut Self {
        self.scope = scope;
        self
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql(0)?;
        let query = format!(
            "SELECT * FROM {} WHERE {} ORDER BY \"id\"",
            DatabaseManager::quote_identifier(&self.table_name),
            where_result.query
        );
        Ok(SqlResult { query, params: where_result.params })
    }

    /// WHERE body only; placeholders start after `starting_param_index` already-bound values
    pub fn to_where_sql(&self, starting_param_index: usize) -> Result<SqlResult, FilterError> {
        let (query, params) = FilterWhere::generate(&self.where_data, starting_param_index, self.scope)?;
        Ok(SqlResult { query, params })
    }
}
