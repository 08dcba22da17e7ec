// HTTP API Error Types
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::database::descriptor::DescriptorError;
use crate::database::DatabaseError;
use crate::filter::FilterError;

/// HTTP API error; every variant renders as `{ success: false, error }`
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    Validation(String),
    NotFound(String),
    Conflict(String),
    Transaction(String),

    // 401 Unauthorized
    Authentication(String),
    Unauthorized(String),

    // 404 Not Found (routing only)
    RouteNotFound(String),

    // 500 Internal Server Error
    Internal(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Transaction(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get client-facing error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Validation(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Transaction(msg)
            | ApiError::Authentication(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::RouteNotFound(msg)
            | ApiError::Internal(msg) => msg,
        }
    }

    /// Stable error code, used in logs
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Transaction(_) => "TRANSACTION_ERROR",
            ApiError::Authentication(_) => "AUTHENTICATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": self.message(),
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ApiError::Authentication(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn route_not_found(message: impl Into<String>) -> Self {
        ApiError::RouteNotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

// Convert other error types to ApiError
impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::InvalidTableName(msg) | DatabaseError::Validation(msg) => {
                ApiError::Validation(msg)
            }
            DatabaseError::NotFound(msg) => ApiError::NotFound(msg),
            DatabaseError::Conflict(msg) => ApiError::Conflict(msg),
            DatabaseError::Descriptor(e) => e.into(),
            DatabaseError::Filter(e) => e.into(),
            DatabaseError::Sqlx(sqlx_err) => {
                // Driver text can name schema internals; it stays in the log
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::Transaction("Database operation failed".to_string())
            }
            DatabaseError::InvalidDatabaseUrl(msg) => {
                tracing::error!("Database configuration error: {}", msg);
                ApiError::internal("Database is misconfigured")
            }
            DatabaseError::Hashing(msg) => {
                tracing::error!("Password hashing failed: {}", msg);
                ApiError::internal("Failed to process credentials")
            }
        }
    }
}

impl From<DescriptorError> for ApiError {
    fn from(err: DescriptorError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingHeader | AuthError::MalformedHeader(_) => {
                ApiError::Authentication(err.to_string())
            }
            AuthError::InvalidCredentials | AuthError::Forbidden(_) => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::Database(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "{}", self.message());
        } else {
            tracing::warn!(code = self.error_code(), "request rejected: {}", self.message());
        }
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let err = ApiError::conflict("user 'bob' already deleted");
        let body = err.to_json();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "user 'bob' already deleted");
        assert_eq!(body.as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::authentication("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::route_not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::internal("x").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_database_errors_map_to_taxonomy() {
        let err: ApiError = DatabaseError::Conflict("table 'a' already exists".into()).into();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err: ApiError = DatabaseError::InvalidTableName("bad".into()).into();
        assert!(matches!(err, ApiError::Validation(_)));

        let err: ApiError = DatabaseError::Sqlx(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, ApiError::Transaction(_)));
        assert_eq!(err.message(), "Database operation failed");
    }

    #[test]
    fn test_auth_errors_split_401_kinds() {
        let err: ApiError = AuthError::MissingHeader.into();
        assert!(matches!(err, ApiError::Authentication(_)));

        let err: ApiError = AuthError::InvalidCredentials.into();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
