//! Conversions between JSON values and rows of the `Any` driver.

use serde_json::{Map, Number, Value};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Column, Row, ValueRef};

pub type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// Decode a row into a JSON object keyed by column name.
///
/// The `Any` driver only exposes a handful of scalar kinds, so each column is
/// probed in turn; anything undecodable becomes `null`.
pub fn row_to_json(row: &AnyRow) -> Map<String, Value> {
    let mut map = Map::new();

    for i in 0..row.len() {
        let column_name = row.column(i).name().to_string();

        let is_null = row.try_get_raw(i).map(|raw| raw.is_null()).unwrap_or(true);
        if is_null {
            map.insert(column_name, Value::Null);
            continue;
        }

        let json_value = if let Ok(v) = row.try_get::<i64, _>(i) {
            Value::Number(v.into())
        } else if let Ok(v) = row.try_get::<i32, _>(i) {
            Value::Number(v.into())
        } else if let Ok(v) = row.try_get::<f64, _>(i) {
            Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<bool, _>(i) {
            Value::Bool(v)
        } else if let Ok(v) = row.try_get::<String, _>(i) {
            Value::String(v)
        } else {
            Value::Null
        };

        map.insert(column_name, json_value);
    }

    map
}

/// Bind one JSON parameter. Callers render `null` as literal SQL, so it is
/// never passed here; structured values are stored as their JSON text.
pub fn bind_value<'q>(query: AnyQuery<'q>, value: &Value) -> AnyQuery<'q> {
    match value {
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        Value::Null | Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
    }
}

/// Bind every parameter of a generated statement, in order
pub fn bind_all<'q>(mut query: AnyQuery<'q>, params: &[Value]) -> AnyQuery<'q> {
    for param in params {
        query = bind_value(query, param);
    }
    query
}
