//! Runtime table definitions.
//!
//! A [`TableDescriptor`] is the ordered column list a caller supplies when
//! creating or extending a table. It is parsed from request JSON and turned
//! into dialect-specific DDL; it never touches the credential store.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::dialect::Dialect;
use super::manager::DatabaseManager;
use crate::filter::validate_identifier;

pub const ID: &str = "id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";
pub const DELETED_AT: &str = "deletedAt";

/// Columns every generic table carries; callers may not declare or write them
pub const SYSTEM_COLUMNS: [&str; 4] = [ID, CREATED_AT, UPDATED_AT, DELETED_AT];

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Table definition must declare at least one column")]
    Empty,

    #[error("Table definition must be an object or an array of column specs")]
    InvalidShape,

    #[error("Invalid column name: {0}")]
    InvalidColumnName(String),

    #[error("Column '{0}' is managed by the server and cannot be declared")]
    ReservedColumn(String),

    #[error("Column '{0}' is declared more than once")]
    DuplicateColumn(String),

    #[error("Unknown type '{ty}' for column '{column}'")]
    UnknownType { column: String, ty: String },

    #[error("Invalid definition for column '{column}': {reason}")]
    InvalidSpec { column: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
}

impl ColumnType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" | "varchar" => Some(ColumnType::String),
            "text" => Some(ColumnType::Text),
            "integer" | "int" | "bigint" => Some(ColumnType::Integer),
            "float" | "double" | "real" | "number" | "decimal" => Some(ColumnType::Float),
            "boolean" | "bool" => Some(ColumnType::Boolean),
            "date" | "datetime" | "timestamp" => Some(ColumnType::Date),
            _ => None,
        }
    }

    /// Type implied by a sample value; `None` for null, arrays and objects
    pub fn infer(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(ColumnType::String),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(ColumnType::Integer),
            Value::Number(_) => Some(ColumnType::Float),
            Value::Bool(_) => Some(ColumnType::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<Value>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            unique: false,
            default: None,
        }
    }

    /// `{ "type": "string", "allowNull": false, "unique": true, "default": "x" }`
    fn from_object(name: &str, spec: &Map<String, Value>) -> Result<Self, DescriptorError> {
        let invalid = |reason: &str| DescriptorError::InvalidSpec {
            column: name.to_string(),
            reason: reason.to_string(),
        };

        let ty = spec
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing string field 'type'"))?;
        let column_type = ColumnType::parse(ty).ok_or_else(|| DescriptorError::UnknownType {
            column: name.to_string(),
            ty: ty.to_string(),
        })?;

        let flag = |key: &str, default: bool| -> Result<bool, DescriptorError> {
            match spec.get(key) {
                None | Some(Value::Null) => Ok(default),
                Some(Value::Bool(b)) => Ok(*b),
                Some(_) => Err(invalid(&format!("'{}' must be a boolean", key))),
            }
        };

        let default = match spec.get("default").or_else(|| spec.get("defaultValue")) {
            None | Some(Value::Null) => None,
            Some(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => Some(v.clone()),
            Some(_) => return Err(invalid("'default' must be a scalar")),
        };

        Ok(Self {
            name: name.to_string(),
            column_type,
            nullable: flag("allowNull", true)?,
            unique: flag("unique", false)?,
            default,
        })
    }

    pub fn definition_sql(&self, dialect: Dialect) -> String {
        let mut sql = format!(
            "{} {}",
            DatabaseManager::quote_identifier(&self.name),
            dialect.sql_type(self.column_type)
        );
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_literal(default));
        }
        sql
    }
}

fn default_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDescriptor {
    columns: Vec<ColumnSpec>,
    sample_row: Option<Map<String, Value>>,
}

impl TableDescriptor {
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self, DescriptorError> {
        let mut descriptor = Self::default();
        for column in columns {
            descriptor.push(column)?;
        }
        descriptor.ensure_not_empty()?;
        Ok(descriptor)
    }

    /// Accepts an array of `{ name, type, .. }` specs, or an object mapping
    /// column names to either a spec object or a sample value. Sample values
    /// infer the column type and together form the table's first row.
    pub fn from_json(data: &Value) -> Result<Self, DescriptorError> {
        let mut descriptor = Self::default();
        match data {
            Value::Array(specs) => {
                for spec in specs {
                    let spec = spec.as_object().ok_or(DescriptorError::InvalidShape)?;
                    let name = spec
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| DescriptorError::InvalidColumnName(String::new()))?;
                    descriptor.push(ColumnSpec::from_object(name, spec)?)?;
                }
            }
            Value::Object(columns) => {
                let mut sample = Map::new();
                for (name, value) in columns {
                    match value {
                        Value::Object(spec) => descriptor.push(ColumnSpec::from_object(name, spec)?)?,
                        _ => {
                            let column_type = ColumnType::infer(value).ok_or_else(|| {
                                DescriptorError::InvalidSpec {
                                    column: name.clone(),
                                    reason: format!("cannot infer a column type from {}", value),
                                }
                            })?;
                            descriptor.push(ColumnSpec::new(name.clone(), column_type))?;
                            sample.insert(name.clone(), value.clone());
                        }
                    }
                }
                if !sample.is_empty() {
                    descriptor.sample_row = Some(sample);
                }
            }
            _ => return Err(DescriptorError::InvalidShape),
        }
        descriptor.ensure_not_empty()?;
        Ok(descriptor)
    }

    fn push(&mut self, column: ColumnSpec) -> Result<(), DescriptorError> {
        if !validate_identifier(&column.name) {
            return Err(DescriptorError::InvalidColumnName(column.name));
        }
        if SYSTEM_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(&column.name)) {
            return Err(DescriptorError::ReservedColumn(column.name));
        }
        if self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
            return Err(DescriptorError::DuplicateColumn(column.name));
        }
        self.columns.push(column);
        Ok(())
    }

    fn ensure_not_empty(&self) -> Result<(), DescriptorError> {
        if self.columns.is_empty() {
            Err(DescriptorError::Empty)
        } else {
            Ok(())
        }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn sample_row(&self) -> Option<&Map<String, Value>> {
        self.sample_row.as_ref()
    }

    pub fn create_table_sql(&self, table_name: &str, dialect: Dialect) -> String {
        let mut definitions = vec![
            dialect.primary_key_sql().to_string(),
            format!("{} TEXT NOT NULL", DatabaseManager::quote_identifier(CREATED_AT)),
            format!("{} TEXT NOT NULL", DatabaseManager::quote_identifier(UPDATED_AT)),
            format!("{} TEXT", DatabaseManager::quote_identifier(DELETED_AT)),
        ];
        definitions.extend(self.columns.iter().map(|c| c.definition_sql(dialect)));

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            DatabaseManager::quote_identifier(table_name),
            definitions.join(",\n    ")
        )
    }

    pub fn add_column_sql(table_name: &str, column: &ColumnSpec, dialect: Dialect) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            DatabaseManager::quote_identifier(table_name),
            column.definition_sql(dialect)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_sample_values_in_order() {
        let descriptor =
            TableDescriptor::from_json(&json!({ "title": "title text", "pages": 12, "rating": 4.5, "read": false }))
                .unwrap();
        let types: Vec<_> = descriptor
            .columns()
            .iter()
            .map(|c| (c.name.as_str(), c.column_type))
            .collect();
        assert_eq!(
            types,
            vec![
                ("title", ColumnType::String),
                ("pages", ColumnType::Integer),
                ("rating", ColumnType::Float),
                ("read", ColumnType::Boolean),
            ]
        );
        assert_eq!(descriptor.sample_row().map(|r| r.len()), Some(4));
    }

    #[test]
    fn parses_spec_array_without_sample_row() {
        let descriptor = TableDescriptor::from_json(&json!([
            { "name": "sku", "type": "string", "allowNull": false, "unique": true },
            { "name": "price", "type": "float", "default": 0 }
        ]))
        .unwrap();
        assert!(descriptor.sample_row().is_none());
        let sku = &descriptor.columns()[0];
        assert!(!sku.nullable);
        assert!(sku.unique);
        assert_eq!(descriptor.columns()[1].default, Some(json!(0)));
    }

    #[test]
    fn rejects_malformed_definitions() {
        assert!(matches!(TableDescriptor::from_json(&json!({})), Err(DescriptorError::Empty)));
        assert!(matches!(TableDescriptor::from_json(&json!("x")), Err(DescriptorError::InvalidShape)));
        assert!(matches!(
            TableDescriptor::from_json(&json!({ "deletedAt": "x" })),
            Err(DescriptorError::ReservedColumn(_))
        ));
        assert!(matches!(
            TableDescriptor::from_json(&json!({ "bad name": "x" })),
            Err(DescriptorError::InvalidColumnName(_))
        ));
        assert!(matches!(
            TableDescriptor::from_json(&json!({ "a": { "type": "blob" } })),
            Err(DescriptorError::UnknownType { .. })
        ));
        assert!(matches!(
            TableDescriptor::from_json(&json!({ "a": null })),
            Err(DescriptorError::InvalidSpec { .. })
        ));
        assert!(matches!(
            TableDescriptor::from_json(&json!([{ "name": "a", "type": "text" }, { "name": "A", "type": "text" }])),
            Err(DescriptorError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn create_table_always_has_soft_delete_column() {
        let descriptor = TableDescriptor::new(vec![ColumnSpec::new("title", ColumnType::String)]).unwrap();
        let sql = descriptor.create_table_sql("books", Dialect::Sqlite);
        assert!(sql.starts_with("CREATE TABLE \"books\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"deletedAt\" TEXT,"));
        assert!(sql.contains("\"title\" VARCHAR(255)"));

        let pg = descriptor.create_table_sql("books", Dialect::Postgres);
        assert!(pg.contains("\"id\" BIGSERIAL PRIMARY KEY"));
    }

    #[test]
    fn column_definition_with_constraints() {
        let mut column = ColumnSpec::new("note", ColumnType::Text);
        column.nullable = false;
        column.default = Some(json!("it's"));
        assert_eq!(
            TableDescriptor::add_column_sql("books", &column, Dialect::Postgres),
            "ALTER TABLE \"books\" ADD COLUMN \"note\" TEXT NOT NULL DEFAULT 'it''s'"
        );
    }
}
