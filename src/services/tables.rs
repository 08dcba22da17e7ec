use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::auth::Principal;
use crate::database::TableDescriptor;
use crate::error::ApiError;
use crate::server::AppState;
use crate::types::TableAction;

/// Body of `POST /table/:action` and `POST /data/:action`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableRequest {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub filter: Option<Map<String, Value>>,
}

impl TableRequest {
    fn table(&self) -> Result<&str, ApiError> {
        match self.table.as_deref().map(str::trim) {
            Some(table) if !table.is_empty() => Ok(table),
            _ => Err(ApiError::validation("Field 'table' is required")),
        }
    }

    fn data(&self) -> Result<&Value, ApiError> {
        match &self.data {
            Some(Value::Null) | None => Err(ApiError::validation("Field 'data' is required")),
            Some(data) => Ok(data),
        }
    }

    fn data_object(&self) -> Result<&Map<String, Value>, ApiError> {
        self.data()?
            .as_object()
            .ok_or_else(|| ApiError::validation("Field 'data' must be an object"))
    }

    /// Row selector: `filter`, or `data` when no filter is given
    fn selector(&self) -> Result<Option<Map<String, Value>>, ApiError> {
        if let Some(filter) = &self.filter {
            return Ok(Some(filter.clone()));
        }
        match &self.data {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            Some(_) => Err(ApiError::validation("Row selector must be an object")),
        }
    }
}

pub struct TableService<'a> {
    state: &'a AppState,
    actor: &'a Principal,
}

impl<'a> TableService<'a> {
    pub fn new(state: &'a AppState, actor: &'a Principal) -> Self {
        Self { state, actor }
    }

    pub async fn execute(&self, action: TableAction, request: TableRequest) -> Result<Value, ApiError> {
        if action.is_structural() {
            self.state.gate.require_admin_or_token(self.actor).await?;
        }
        let table = request.table()?;
        let tables = &self.state.tables;

        let result = match action {
            TableAction::Read => {
                let rows = tables.read(table, request.selector()?).await?;
                return Ok(Value::Array(rows.into_iter().map(Value::Object).collect()));
            }
            TableAction::Create => {
                let descriptor = TableDescriptor::from_json(request.data()?)?;
                tables.create(table, &descriptor).await?
            }
            TableAction::Add => Value::Object(tables.add(table, request.data_object()?).await?),
            TableAction::Update => match &request.filter {
                Some(filter) => {
                    let rows = tables.update_rows(table, filter.clone(), request.data_object()?).await?;
                    json!({ "updated": rows.len(), "rows": rows })
                }
                None => {
                    // Schema sync is DDL, so it is gated like the structural actions
                    self.state.gate.require_admin_or_token(self.actor).await?;
                    let descriptor = TableDescriptor::from_json(request.data()?)?;
                    let added = tables.sync_schema(table, &descriptor).await?;
                    json!({ "table": table, "added": added })
                }
            },
            TableAction::Delete => match request.selector()? {
                Some(filter) => json!({ "deleted": tables.delete_rows(table, filter).await? }),
                None => {
                    let renamed = tables.delete_table(table).await?;
                    json!({ "table": table, "deletedAs": renamed })
                }
            },
            TableAction::Restore => match request.selector()? {
                Some(filter) => json!({ "restored": tables.restore_rows(table, filter).await? }),
                None => json!({ "table": tables.restore_table(table).await? }),
            },
            TableAction::Drop => match request.selector()? {
                Some(filter) => json!({ "dropped": tables.drop_rows(table, filter).await? }),
                None => json!({ "table": tables.drop_table(table).await?, "dropped": true }),
            },
        };

        info!(table, action = ?action, actor = ?self.actor, "table operation completed");
        self.state.refresh_cache().await;
        Ok(result)
    }
}
