//! OTP ledger semantics: single use, expiry, resend invalidation, and
//! channel binding.

mod common;

use common::{device, harness};
use server_core::common::AppError;
use server_core::domains::auth::types::*;
use server_core::domains::otp::{DeliveryChannel, OtpPurpose};
use server_core::kernel::test_deps::test_user;

const PHONE: &str = "+14155551234";

async fn phone_challenge(h: &common::TestHarness) -> (OtpChallenge, String) {
    let outcome = h
        .auth
        .login(
            LoginRequest {
                provider: "phone".to_string(),
                phone: Some(PHONE.to_string()),
                email: None,
                password: None,
            },
            &device(),
        )
        .await
        .unwrap();

    let LoginOutcome::Challenge(challenge) = outcome else {
        panic!("expected challenge");
    };
    let code = h.stores.queue.last_code().unwrap();
    (challenge, code)
}

#[tokio::test]
async fn test_otp_is_single_use() {
    let h = harness();
    let (challenge, code) = phone_challenge(&h).await;

    let request = |code: String| VerifyOtpRequest {
        otp_id: challenge.otp_id,
        code,
        email: None,
        phone: None,
    };

    h.auth
        .verify_otp(request(code.clone()), &device())
        .await
        .unwrap();

    // Same code again: spent
    let second = h.auth.verify_otp(request(code), &device()).await;
    assert!(matches!(second, Err(AppError::Unauthorized(_))));
}

#[tokio::test]
async fn test_expired_otp_fails() {
    let h = harness();
    let (challenge, code) = phone_challenge(&h).await;

    h.stores.otps.expire(challenge.otp_id);

    let result = h
        .auth
        .verify_otp(
            VerifyOtpRequest {
                otp_id: challenge.otp_id,
                code,
                email: None,
                phone: None,
            },
            &device(),
        )
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));
}

#[tokio::test]
async fn test_resend_invalidates_previous_codes() {
    let h = harness();
    let (first, first_code) = phone_challenge(&h).await;

    let second = h
        .auth
        .resend_otp(ResendOtpRequest {
            channel: "phone".to_string(),
            purpose: "login".to_string(),
            identifier: PHONE.to_string(),
        })
        .await
        .unwrap();
    let second_code = h.stores.queue.last_code().unwrap();

    // Old code is dead even though it was never used
    let old = h
        .auth
        .verify_otp(
            VerifyOtpRequest {
                otp_id: first.otp_id,
                code: first_code,
                email: None,
                phone: None,
            },
            &device(),
        )
        .await;
    assert!(matches!(old, Err(AppError::Unauthorized(_))));

    // Only the newest verifies
    h.auth
        .verify_otp(
            VerifyOtpRequest {
                otp_id: second.otp_id,
                code: second_code,
                email: None,
                phone: None,
            },
            &device(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_resend_for_unknown_identifier_fails() {
    let h = harness();

    let result = h
        .auth
        .resend_otp(ResendOtpRequest {
            channel: "phone".to_string(),
            purpose: "login".to_string(),
            identifier: "+19995550000".to_string(),
        })
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_otp_bound_to_delivery_channel() {
    let h = harness();

    let mut user = test_user("email");
    user.email = Some("iris@example.com".to_string());
    h.stores.users.seed(user.clone());

    let otp_id = h
        .otp_service
        .issue(
            user.id,
            OtpPurpose::Verify,
            DeliveryChannel::Email("iris@example.com".to_string()),
        )
        .await
        .unwrap();
    let code = h.stores.queue.last_code().unwrap();

    // Cross-check with the wrong email: fails without spending the code
    let mismatch = h
        .otp_service
        .consume(otp_id, &code, None, Some("other@example.com"), None)
        .await;
    assert!(mismatch.is_err());

    // Matching email verifies and flips the flag
    let consumed = h
        .otp_service
        .consume(otp_id, &code, None, Some("iris@example.com"), None)
        .await
        .unwrap();
    assert!(consumed.user.is_email_verified);
}
