use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde_json::Value;

use crate::auth::Principal;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;
use crate::services::{UserRequest, UserService};
use crate::types::UserAction;

/// POST /user/:action - create, read, update, delete, restore, drop
pub async fn user_action(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(action): Path<String>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let action: UserAction = action
        .parse()
        .map_err(|e: crate::types::UnknownName| ApiError::route_not_found(e.to_string()))?;
    let Json(request) = payload?;

    let result = UserService::new(&state, &principal).execute(action, request).await?;
    Ok(ApiResponse::success(result))
}
