use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter::validate_identifier;
use super::types::{FilterOp, FilterWhereInfo, RowScope};
use crate::database::descriptor::DELETED_AT;
use crate::database::DatabaseManager;

pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
    conditions: Vec<FilterWhereInfo>,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            conditions: vec![],
        }
    }

    pub fn generate(
        where_data: &Map<String, Value>,
        starting_param_index: usize,
        scope: RowScope,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        filter_where.parse_where_data(where_data)?;
        Ok(filter_where.build(scope))
    }

    pub fn validate(where_data: &Map<String, Value>) -> Result<(), FilterError> {
        Self::new(0).parse_where_data(where_data)
    }

    fn build(&mut self, scope: RowScope) -> (String, Vec<Value>) {
        let mut sql_conditions = vec![];
        let deleted_at = DatabaseManager::quote_identifier(DELETED_AT);
        match scope {
            RowScope::Live => sql_conditions.push(format!("{} IS NULL", deleted_at)),
            RowScope::Deleted => sql_conditions.push(format!("{} IS NOT NULL", deleted_at)),
            RowScope::All => {}
        }

        let conditions = std::mem::take(&mut self.conditions);
        for condition in &conditions {
            let sql = self.build_sql_condition(condition);
            sql_conditions.push(sql);
        }

        let where_clause = if sql_conditions.is_empty() {
            "1=1".to_string()
        } else {
            sql_conditions.join(" AND ")
        };
        (where_clause, std::mem::take(&mut self.param_values))
    }

    fn parse_where_data(&mut self, where_data: &Map<String, Value>) -> Result<(), FilterError> {
        for (column, value) in where_data {
            if !validate_identifier(column) {
                return Err(FilterError::InvalidColumn(column.clone()));
            }
            match value {
                Value::Object(ops) => {
                    if ops.is_empty() {
                        return Err(FilterError::InvalidWhereClause(format!(
                            "empty operator object for column '{}'",
                            column
                        )));
                    }
                    for (op, operand) in ops {
                        let operator = FilterOp::parse(op)
                            .ok_or_else(|| FilterError::UnsupportedOperator(op.clone()))?;
                        Self::validate_operand(column, operator, operand)?;
                        self.conditions.push(FilterWhereInfo {
                            column: column.clone(),
                            operator,
                            data: operand.clone(),
                        });
                    }
                }
                Value::Array(_) => {
                    Self::validate_operand(column, FilterOp::In, value)?;
                    self.conditions.push(FilterWhereInfo {
                        column: column.clone(),
                        operator: FilterOp::In,
                        data: value.clone(),
                    });
                }
                _ => self.conditions.push(FilterWhereInfo {
                    column: column.clone(),
                    operator: FilterOp::Eq,
                    data: value.clone(),
                }),
            }
        }
        Ok(())
    }

    fn validate_operand(column: &str, operator: FilterOp, operand: &Value) -> Result<(), FilterError> {
        let is_scalar = |v: &Value| !matches!(v, Value::Array(_) | Value::Object(_));
        let valid = match operator {
            FilterOp::In => match operand {
                Value::Array(items) => !items.is_empty() && items.iter().all(|v| is_scalar(v) && !v.is_null()),
                _ => false,
            },
            FilterOp::Like => operand.is_string(),
            FilterOp::Eq | FilterOp::Ne => is_scalar(operand),
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => is_scalar(operand) && !operand.is_null(),
        };
        if valid {
            Ok(())
        } else {
            Err(FilterError::InvalidOperatorData(format!(
                "{:?} on column '{}' does not accept {}",
                operator, column, operand
            )))
        }
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> String {
        let column = DatabaseManager::quote_identifier(&condition.column);
        match (condition.operator, &condition.data) {
            (FilterOp::Eq, Value::Null) => format!("{} IS NULL", column),
            (FilterOp::Ne, Value::Null) => format!("{} IS NOT NULL", column),
            (FilterOp::In, Value::Array(items)) => {
                let placeholders: Vec<String> =
                    items.iter().map(|item| self.next_param(item.clone())).collect();
                format!("{} IN ({})", column, placeholders.join(", "))
            }
            (operator, data) => {
                let placeholder = self.next_param(data.clone());
                format!("{} {} {}", column, operator.to_sql(), placeholder)
            }
        }
    }

    fn next_param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}
