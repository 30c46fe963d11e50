//! OTP verification and resend endpoints.

use axum::extract::Extension;
use axum::Json;

use crate::common::AppError;
use crate::domains::auth::types::*;
use crate::domains::sessions::DeviceContext;
use crate::server::app::AppState;

pub async fn verify_otp_handler(
    Extension(state): Extension<AppState>,
    context: Option<Extension<DeviceContext>>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<VerifyOtpOutcome>, AppError> {
    let device = context.map(|Extension(d)| d).unwrap_or_default();
    let outcome = state.auth_service.verify_otp(request, &device).await?;
    Ok(Json(outcome))
}

pub async fn resend_otp_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<ResendOtpRequest>,
) -> Result<Json<OtpChallenge>, AppError> {
    let challenge = state.auth_service.resend_otp(request).await?;
    Ok(Json(challenge))
}
