use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use note_hub_core::CoreError;
use serde_json::json;
use tracing::error;

/// Core outcome rendered as an HTTP error.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CoreError::PermissionDenied => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Locked | CoreError::NotHolder => StatusCode::LOCKED,
            CoreError::VersionConflict { .. } => StatusCode::CONFLICT,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self.0 {
            CoreError::BadRequest(msg) => json!({ "error": msg }),
            CoreError::Unauthenticated => json!({ "error": "Invalid token" }),
            CoreError::PermissionDenied => json!({ "error": "Permission denied" }),
            CoreError::NotFound(_) => json!({ "error": "Not found" }),
            CoreError::Locked => json!({ "error": "Locked" }),
            CoreError::NotHolder => json!({ "error": "Not lock holder" }),
            CoreError::VersionConflict { actual, .. } => {
                json!({ "error": "Version conflict", "currentVersion": actual })
            }
            CoreError::Internal(detail) => {
                error!(%detail, "request failed");
                json!({ "error": "Internal error" })
            }
        };
        (status, Json(body)).into_response()
    }
}
