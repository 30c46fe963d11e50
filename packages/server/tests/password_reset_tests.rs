//! Password reset: enumeration-safe request, OTP hand-off, watermark
//! single-use enforcement.

mod common;

use common::{device, harness};
use server_core::common::AppError;
use server_core::domains::auth::types::*;
use server_core::kernel::test_deps::test_user;

const EMAIL: &str = "kim@example.com";

fn seed_email_user(h: &common::TestHarness) -> server_core::domains::users::User {
    let mut user = test_user("email");
    user.email = Some(EMAIL.to_string());
    user.is_email_verified = true;
    user.password_hash = Some("hashed:old-password".to_string());
    h.stores.users.seed(user.clone());
    user
}

#[tokio::test]
async fn test_unknown_email_gets_identical_response() {
    let h = harness();
    let user = seed_email_user(&h);

    let known = h.auth.request_password_reset(EMAIL).await.unwrap();
    let unknown = h
        .auth
        .request_password_reset("ghost@example.com")
        .await
        .unwrap();

    // Same message either way; the decoy otp id is indistinguishable
    assert_eq!(known.message, unknown.message);

    // But only the real account got a code enqueued
    let commands = h.stores.queue.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].user_id, user.id);
}

#[tokio::test]
async fn test_social_account_cannot_reset_password() {
    let h = harness();

    let mut user = test_user("google");
    user.email = Some("gia@example.com".to_string());
    h.stores.users.seed(user);

    let result = h.auth.request_password_reset("gia@example.com").await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_login_otp_rejected_in_reset_flow() {
    let h = harness();
    let user = seed_email_user(&h);

    // Issue a login-purpose code, then try to use it for reset
    let otp_id = h
        .otp_service
        .issue(
            user.id,
            server_core::domains::otp::OtpPurpose::Login,
            server_core::domains::otp::DeliveryChannel::Email(EMAIL.to_string()),
        )
        .await
        .unwrap();
    let code = h.stores.queue.last_code().unwrap();

    let result = h
        .auth
        .verify_password_reset_otp(VerifyResetOtpRequest {
            email: EMAIL.to_string(),
            otp_id,
            code,
        })
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));
}

#[tokio::test]
async fn test_full_reset_flow_and_watermark() {
    let h = harness();
    let user = seed_email_user(&h);

    let challenge = h.auth.request_password_reset(EMAIL).await.unwrap();
    let code = h.stores.queue.last_code().unwrap();

    let reset = h
        .auth
        .verify_password_reset_otp(VerifyResetOtpRequest {
            email: EMAIL.to_string(),
            otp_id: challenge.otp_id,
            code,
        })
        .await
        .unwrap();

    h.auth
        .reset_password(ResetPasswordRequest {
            reset_token: reset.reset_token.clone(),
            new_password: "brand-new-password".to_string(),
        })
        .await
        .unwrap();

    let stored = h.stores.users.get(user.id).unwrap();
    assert_eq!(
        stored.password_hash.as_deref(),
        Some("hashed:brand-new-password")
    );
    assert!(stored.last_password_reset_at.is_some());

    // The same token a second time: dead. The watermark comparison is
    // inclusive at second resolution, so this holds even when the reset
    // lands in the same second the token was minted.
    let reuse = h
        .auth
        .reset_password(ResetPasswordRequest {
            reset_token: reset.reset_token,
            new_password: "another-password".to_string(),
        })
        .await;
    assert!(matches!(reuse, Err(AppError::Unauthorized(_))));
}

#[tokio::test]
async fn test_reset_rejects_weak_password() {
    let h = harness();
    let user = seed_email_user(&h);

    let token = h
        .jwt
        .create_reset_token(user.id, EMAIL, 10)
        .unwrap();

    let result = h
        .auth
        .reset_password(ResetPasswordRequest {
            reset_token: token,
            new_password: "short".to_string(),
        })
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_garbage_reset_token_rejected() {
    let h = harness();
    seed_email_user(&h);

    let result = h
        .auth
        .reset_password(ResetPasswordRequest {
            reset_token: "not.a.jwt".to_string(),
            new_password: "brand-new-password".to_string(),
        })
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));
}
