use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde_json::json;
use urlencoding;
use crate::errors::AppError;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::SEE_OTHER,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Maintenance => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Rejected { status, .. } => *status,
            AppError::Upstream(_)
            | AppError::Redis(_)
            | AppError::Session(_)
            | AppError::Http(_)
            | AppError::Archive(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            // Page requests go back to the login form
            AppError::Auth(msg) => {
                Redirect::to(&format!("/auth/login?error={}", urlencoding::encode(&msg)))
                    .into_response()
            }

            AppError::Rejected { message, .. } => (
                status,
                Json(json!({ "success": false, "message": message })),
            )
                .into_response(),

            err => {
                if status.is_server_error() {
                    tracing::error!("Request failed: {}", err);
                }
                (status, Json(json!({ "error": err.to_string() }))).into_response()
            }
        }
    }
}
