//! Auth endpoints: login flows, profile completion, password reset.

use axum::extract::Extension;
use axum::Json;

use crate::common::AppError;
use crate::domains::auth::types::*;
use crate::domains::sessions::DeviceContext;
use crate::domains::users::User;
use crate::server::app::AppState;
use crate::server::middleware::{require_auth, AuthUser};

fn device(context: Option<Extension<DeviceContext>>) -> DeviceContext {
    context.map(|Extension(d)| d).unwrap_or_default()
}

pub async fn login_handler(
    Extension(state): Extension<AppState>,
    context: Option<Extension<DeviceContext>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginOutcome>, AppError> {
    let outcome = state.auth_service.login(request, &device(context)).await?;
    Ok(Json(outcome))
}

pub async fn social_login_handler(
    Extension(state): Extension<AppState>,
    context: Option<Extension<DeviceContext>>,
    Json(request): Json<SocialLoginRequest>,
) -> Result<Json<TokenBundle>, AppError> {
    let bundle = state
        .auth_service
        .social_login(request, &device(context))
        .await?;
    Ok(Json(bundle))
}

pub async fn logout_handler(
    Extension(state): Extension<AppState>,
    auth: Option<Extension<AuthUser>>,
) -> Result<Json<MessageResponse>, AppError> {
    let auth = require_auth(auth.as_deref())?;
    let response = state.auth_service.logout(auth.user_id).await?;
    Ok(Json(response))
}

pub async fn complete_profile_handler(
    Extension(state): Extension<AppState>,
    auth: Option<Extension<AuthUser>>,
    Json(request): Json<CompleteProfileRequest>,
) -> Result<Json<User>, AppError> {
    let auth = require_auth(auth.as_deref())?;
    let user = state
        .auth_service
        .complete_profile(auth.user_id, request)
        .await?;
    Ok(Json(user))
}

pub async fn request_password_reset_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<OtpChallenge>, AppError> {
    let challenge = state
        .auth_service
        .request_password_reset(&request.email)
        .await?;
    Ok(Json(challenge))
}

pub async fn verify_password_reset_otp_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<VerifyResetOtpRequest>,
) -> Result<Json<ResetTokenResponse>, AppError> {
    let response = state.auth_service.verify_password_reset_otp(request).await?;
    Ok(Json(response))
}

pub async fn reset_password_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let response = state.auth_service.reset_password(request).await?;
    Ok(Json(response))
}
