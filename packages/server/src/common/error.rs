use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error taxonomy.
///
/// Every variant carries a single human-readable message; internal detail
/// (database errors, queue errors) is logged server-side and never reaches
/// the client.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input, rejected before any side effect.
    #[error("{0}")]
    Validation(String),

    /// Lookup miss that is safe to surface.
    #[error("{0}")]
    NotFound(String),

    /// Bad credentials, invalid/expired/used OTP, invalid token, revoked
    /// session. Messages stay generic to avoid oracles.
    #[error("{0}")]
    Unauthorized(String),

    /// Duplicate email/phone or a one-time transition attempted twice.
    #[error("{0}")]
    Conflict(String),

    /// A recognized operation this deployment does not support.
    #[error("{0}")]
    NotImplemented(String),

    /// Collaborator failure (queue, token verification). Retryable by the
    /// caller; compensating cleanup has already run.
    #[error("{0}")]
    Dependency(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal detail stays server-side
        let message = match &self {
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized("no".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Dependency("queue".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_internal_error_masks_detail() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused at 10.0.0.5"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
