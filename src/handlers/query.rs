use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use serde_json::Value;

use crate::auth::Principal;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;
use crate::services::{query, CommandRequest};

/// POST /query - raw SQL passthrough
pub async fn raw_query(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload?;
    let rows = query::execute(&state, &principal, request).await?;
    Ok(ApiResponse::success(rows))
}
