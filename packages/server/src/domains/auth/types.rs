//! Request and response payloads for the auth surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domains::users::User;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// "phone" or "email"
    pub provider: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SocialLoginRequest {
    /// "google" or "apple"
    pub provider: String,
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp_id: Uuid,
    pub code: String,
    /// Optional cross-checks binding the OTP to its delivery channel.
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResendOtpRequest {
    /// "phone" or "email"
    #[serde(rename = "type")]
    pub channel: String,
    pub purpose: String,
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub is_advisor: bool,
    pub terms_accepted: bool,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyResetOtpRequest {
    pub email: String,
    pub otp_id: Uuid,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub reset_token: String,
    pub new_password: String,
}

/// Response to a login that ends in an OTP challenge rather than tokens.
#[derive(Debug, Serialize)]
pub struct OtpChallenge {
    pub otp_id: Uuid,
    pub message: String,
}

/// The convergence payload of every successful authentication.
#[derive(Debug, Serialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub user: User,
    pub profile_completion_required: bool,
}

/// Login either hands back tokens immediately (email+password, social) or
/// defers to an OTP challenge (phone, first-time email).
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginOutcome {
    Challenge(OtpChallenge),
    Tokens(TokenBundle),
}

/// Verification result for non-login purposes.
#[derive(Debug, Serialize)]
pub struct VerifiedOtp {
    pub user_id: Uuid,
    pub purpose: String,
}

/// A login-purpose OTP chains into session issuance; any other purpose
/// hands control back to the caller's multi-step flow.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum VerifyOtpOutcome {
    Tokens(TokenBundle),
    Verified(VerifiedOtp),
}

#[derive(Debug, Serialize)]
pub struct ResetTokenResponse {
    pub reset_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
