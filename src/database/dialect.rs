use serde::{Deserialize, Serialize};

use super::descriptor::ColumnType;
use crate::config::DialectKind;

/// SQL flavour behind the pool. Quoting, `$n` placeholders, `RENAME TO` and
/// `ADD COLUMN` are shared; catalog queries and type names are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl From<DialectKind> for Dialect {
    fn from(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Sqlite => Dialect::Sqlite,
            DialectKind::Postgres => Dialect::Postgres,
        }
    }
}

impl Dialect {
    /// Every base table in the current schema, one `name` column
    pub fn list_tables_sql(&self) -> &'static str {
        match self {
            Dialect::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            // information_schema uses the sql_identifier domain, which the Any driver cannot decode
            Dialect::Postgres => {
                "SELECT CAST(table_name AS TEXT) AS name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' ORDER BY table_name"
            }
        }
    }

    /// Column names of the table bound as `$1`, in declaration order
    pub fn list_columns_sql(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "SELECT name FROM pragma_table_info($1) ORDER BY cid",
            Dialect::Postgres => {
                "SELECT CAST(column_name AS TEXT) AS name FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position"
            }
        }
    }

    pub fn primary_key_sql(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::Postgres => "\"id\" BIGSERIAL PRIMARY KEY",
        }
    }

    /// Integer type that decodes as i64 through the Any driver
    pub fn integer_type(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "INTEGER",
            Dialect::Postgres => "BIGINT",
        }
    }

    pub fn sql_type(&self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (_, ColumnType::String) => "VARCHAR(255)",
            (_, ColumnType::Text) => "TEXT",
            (_, ColumnType::Integer) => self.integer_type(),
            (Dialect::Sqlite, ColumnType::Float) => "REAL",
            (Dialect::Postgres, ColumnType::Float) => "DOUBLE PRECISION",
            (_, ColumnType::Boolean) => "BOOLEAN",
            // Timestamps are RFC 3339 text in both dialects
            (_, ColumnType::Date) => "TEXT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mapping_differs_per_dialect() {
        assert_eq!(Dialect::Sqlite.sql_type(ColumnType::Integer), "INTEGER");
        assert_eq!(Dialect::Postgres.sql_type(ColumnType::Integer), "BIGINT");
        assert_eq!(Dialect::Sqlite.sql_type(ColumnType::Float), "REAL");
        assert_eq!(Dialect::Postgres.sql_type(ColumnType::Float), "DOUBLE PRECISION");
        assert_eq!(Dialect::Postgres.sql_type(ColumnType::String), "VARCHAR(255)");
    }

    #[test]
    fn catalog_queries_bind_one_parameter() {
        for dialect in [Dialect::Sqlite, Dialect::Postgres] {
            assert!(dialect.list_columns_sql().contains("$1"));
            assert!(!dialect.list_tables_sql().contains('$'));
        }
    }
}
