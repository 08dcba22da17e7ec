use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use serde_json::Value;

use crate::auth::Principal;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;
use crate::services::{commands, CommandRequest};

/// POST /cmd - admin commands (help, users, admins, deleted, tables, reload, restart, stop)
pub async fn command(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload?;
    let result = commands::execute(&state, &principal, request).await?;
    Ok(ApiResponse::success(result))
}
