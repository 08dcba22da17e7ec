use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde_json::Value;

use crate::auth::Principal;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;
use crate::services::{TableRequest, TableService};
use crate::types::TableAction;

/// POST /table/:action and POST /data/:action - create, read, add, update, delete, restore, drop
pub async fn table_action(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(action): Path<String>,
    payload: Result<Json<TableRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let action: TableAction = action
        .parse()
        .map_err(|e: crate::types::UnknownName| ApiError::route_not_found(e.to_string()))?;
    let Json(request) = payload?;

    let result = TableService::new(&state, &principal).execute(action, request).await?;
    Ok(ApiResponse::success(result))
}
