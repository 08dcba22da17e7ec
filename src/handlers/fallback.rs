use axum::{
    extract::State,
    http::{header::LOCATION, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::server::AppState;

/// `GET *` redirects to the configured site; everything else unmatched is a 404
pub async fn fallback(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    if method == Method::GET {
        return (
            StatusCode::FOUND,
            [(LOCATION, state.config.server.redirect_url.clone())],
        )
            .into_response();
    }
    ApiError::route_not_found(format!("No route for {} {}", method, uri.path())).into_response()
}
