//! Refresh-session endpoints.

use axum::extract::Extension;
use axum::Json;

use crate::common::AppError;
use crate::domains::auth::types::{MessageResponse, RefreshRequest, TokenBundle};
use crate::domains::sessions::DeviceContext;
use crate::server::app::AppState;

/// Rotation-on-use token refresh.
pub async fn refresh_handler(
    Extension(state): Extension<AppState>,
    context: Option<Extension<DeviceContext>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenBundle>, AppError> {
    let device = context.map(|Extension(d)| d).unwrap_or_default();
    let bundle = state
        .auth_service
        .refresh(&request.refresh_token, &device)
        .await?;
    Ok(Json(bundle))
}

/// Revoke the session a refresh token points at. Succeeds regardless of
/// whether the token was live, so it leaks nothing about session state.
pub async fn revoke_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .session_service
        .revoke_by_refresh_token(&request.refresh_token)
        .await?;

    Ok(Json(MessageResponse {
        message: "Session revoked".to_string(),
    }))
}
