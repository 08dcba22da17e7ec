use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::server::AppState;

/// Basic/token authentication; stores the resolved [`Principal`](crate::auth::Principal)
/// in request extensions for the handlers
pub async fn require_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = state.gate.authenticate(&headers).await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
