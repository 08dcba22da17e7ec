use serde_json::Value;
use tracing::{info, warn};

use crate::auth::Principal;
use crate::config::QueryAccess;
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::server::AppState;
use crate::services::commands::CommandRequest;

/// Run caller SQL verbatim in a transaction. Trusted operators only.
pub async fn execute(state: &AppState, actor: &Principal, request: CommandRequest) -> Result<Value, ApiError> {
    match state.config.policy.query_access {
        QueryAccess::AdminOrToken => state.gate.require_admin_or_token(actor).await?,
        QueryAccess::TokenOnly if actor.is_token() => {}
        QueryAccess::TokenOnly => {
            return Err(ApiError::unauthorized("Raw queries require token credentials"));
        }
    }

    let sql = request.text()?;
    warn!(actor = ?actor, "executing raw SQL: {}", sql);

    // The caller wrote the SQL, so the driver's own message is the useful one
    let rows = state.db.raw_query(sql).await.map_err(|e| match e {
        DatabaseError::Sqlx(err) => ApiError::Transaction(err.to_string()),
        other => other.into(),
    })?;
    info!(rows = rows.len(), "raw query completed");

    // Arbitrary SQL may have changed users or tables
    state.refresh_cache().await;
    Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
}
