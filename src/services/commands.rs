use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::Principal;
use crate::error::ApiError;
use crate::server::{AppState, ServerSignal};
use crate::types::Command;

/// Body of `POST /cmd` and `POST /query`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub data: Option<String>,
}

impl CommandRequest {
    pub fn text(&self) -> Result<&str, ApiError> {
        match self.data.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(ApiError::validation("Field 'data' is required")),
        }
    }
}

/// Admin-only introspection and lifecycle commands; tokens are refused
pub async fn execute(state: &AppState, actor: &Principal, request: CommandRequest) -> Result<Value, ApiError> {
    state.gate.require_admin(actor).await?;
    let command: Command = request
        .text()?
        .parse()
        .map_err(|e: crate::types::UnknownName| ApiError::bad_request(e.to_string()))?;

    info!(command = command.name(), actor = ?actor, "executing command");

    let result = match command {
        Command::Help => Value::Array(
            Command::ALL
                .into_iter()
                .map(|c| json!({ "command": c.name(), "description": c.description() }))
                .collect(),
        ),
        Command::Users => json!(state.cache.active().await),
        Command::Admins => json!(state.cache.admins().await),
        Command::Deleted => json!(state.cache.deleted().await),
        Command::Tables => json!({
            "tables": state.cache.tables().await,
            "deleted": state.cache.deleted_tables().await,
        }),
        Command::Reload => {
            let tokens = state
                .cache
                .reload_tokens(&state.config.auth)
                .await
                .map_err(|e| ApiError::internal(format!("Failed to reload tokens: {}", e)))?;
            state.refresh_cache().await;
            let snapshot = state.cache.snapshot().await;
            json!({
                "tokens": tokens,
                "users": snapshot.users.len(),
                "tables": snapshot.tables.len(),
            })
        }
        Command::Restart => {
            state.control.request(ServerSignal::Restart);
            json!("restarting")
        }
        Command::Stop => {
            state.control.request(ServerSignal::Stop);
            json!("stopping")
        }
    };

    Ok(result)
}
