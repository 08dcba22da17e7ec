use serde_json::Value;

/// Comparison operators accepted inside a filter object, e.g. `{ "age": { "$gte": 18 } }`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
}

impl FilterOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "$eq" => Some(FilterOp::Eq),
            "$ne" | "$neq" => Some(FilterOp::Ne),
            "$gt" => Some(FilterOp::Gt),
            "$gte" => Some(FilterOp::Gte),
            "$lt" => Some(FilterOp::Lt),
            "$lte" => Some(FilterOp::Lte),
            "$like" => Some(FilterOp::Like),
            "$in" => Some(FilterOp::In),
            _ => None,
        }
    }

    pub fn to_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Like => "LIKE",
            FilterOp::In => "IN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterWhereInfo {
    pub column: String,
    pub operator: FilterOp,
    pub data: Value,
}

/// Which rows a statement may touch with respect to the `deletedAt` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowScope {
    #[default]
    Live,
    Deleted,
    All,
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}
