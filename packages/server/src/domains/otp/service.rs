//! OTP issuance, verification, and resend.
//!
//! Verification fails closed: a missing, spent, expired, or mismatched code
//! all produce the same generic error so callers cannot probe which check
//! failed. The conditional `mark_used` update is the single-use commit
//! point; everything before it is read-only.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::common::validation::{normalize_email, normalize_phone};
use crate::common::AppError;
use crate::domains::otp::commands::SendOtpCommand;
use crate::domains::otp::{Otp, OtpPurpose, OtpStore};
use crate::domains::users::{User, UserPatch, UserStore};
use crate::kernel::jobs::DeliveryQueue;
use crate::kernel::traits::SecretHasher;

/// Where a code should be sent.
#[derive(Debug, Clone)]
pub enum DeliveryChannel {
    Sms(String),
    Email(String),
}

/// Result of a successful verification: the spent OTP plus the owning user
/// with any verification flags already flipped.
pub struct ConsumedOtp {
    pub otp: Otp,
    pub user: User,
}

pub struct OtpService {
    otps: Arc<dyn OtpStore>,
    users: Arc<dyn UserStore>,
    queue: Arc<dyn DeliveryQueue>,
    hasher: Arc<dyn SecretHasher>,
    otp_ttl_minutes: i64,
    reset_otp_ttl_minutes: i64,
}

fn invalid_otp() -> AppError {
    AppError::Unauthorized("Invalid OTP".to_string())
}

impl OtpService {
    pub fn new(
        otps: Arc<dyn OtpStore>,
        users: Arc<dyn UserStore>,
        queue: Arc<dyn DeliveryQueue>,
        hasher: Arc<dyn SecretHasher>,
        otp_ttl_minutes: i64,
        reset_otp_ttl_minutes: i64,
    ) -> Self {
        Self {
            otps,
            users,
            queue,
            hasher,
            otp_ttl_minutes,
            reset_otp_ttl_minutes,
        }
    }

    fn ttl_minutes(&self, purpose: OtpPurpose) -> i64 {
        match purpose {
            OtpPurpose::Reset => self.reset_otp_ttl_minutes,
            _ => self.otp_ttl_minutes,
        }
    }

    /// Create a code, persist its hash, and enqueue delivery.
    ///
    /// If the enqueue fails the OTP is invalidated before the error
    /// surfaces, so a code that will never arrive can also never verify.
    pub async fn issue(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        channel: DeliveryChannel,
    ) -> Result<Uuid, AppError> {
        let code = generate_code();
        let code_hash = self
            .hasher
            .hash(&code)
            .map_err(AppError::Internal)?;
        let expires_at = Utc::now() + Duration::minutes(self.ttl_minutes(purpose));

        let otp = self
            .otps
            .insert(user_id, purpose, &code_hash, expires_at)
            .await?;

        let command = match channel {
            DeliveryChannel::Sms(phone) => {
                SendOtpCommand::via_phone(phone, code, purpose, user_id, otp.id)
            }
            DeliveryChannel::Email(email) => {
                SendOtpCommand::via_email(email, code, purpose, user_id, otp.id)
            }
        };

        if let Err(e) = self.queue.enqueue(command).await {
            tracing::error!(otp_id = %otp.id, error = %e, "failed to enqueue OTP delivery");
            self.otps.invalidate(otp.id).await?;
            return Err(AppError::Dependency(
                "Could not send verification code, please try again".to_string(),
            ));
        }

        Ok(otp.id)
    }

    /// Verify and spend a code.
    ///
    /// `email`/`phone`, when supplied, are cross-checked against the owning
    /// user so a code sent to one channel cannot be replayed from another;
    /// on match the corresponding verification flag is flipped.
    pub async fn consume(
        &self,
        otp_id: Uuid,
        code: &str,
        expected_purpose: Option<OtpPurpose>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<ConsumedOtp, AppError> {
        let otp = self
            .otps
            .find_by_id(otp_id)
            .await?
            .ok_or_else(invalid_otp)?;

        if otp.used || otp.is_expired(Utc::now()) {
            return Err(invalid_otp());
        }

        if let Some(expected) = expected_purpose {
            if otp.purpose != expected.as_str() {
                return Err(invalid_otp());
            }
        }

        if !self.hasher.verify(code, &otp.code_hash) {
            return Err(invalid_otp());
        }

        let user = self
            .users
            .find_by_id(otp.user_id)
            .await?
            .filter(|u| !u.is_deleted)
            .ok_or_else(invalid_otp)?;

        let mut patch = UserPatch::default();

        if let Some(email) = email {
            let normalized = normalize_email(email);
            match &user.email {
                Some(stored) if *stored == normalized => {
                    if !user.is_email_verified {
                        patch.is_email_verified = Some(true);
                    }
                }
                _ => return Err(invalid_otp()),
            }
        }

        if let Some(phone) = phone {
            let normalized = normalize_phone(phone);
            match &user.phone {
                Some(stored) if *stored == normalized => {
                    if !user.is_phone_verified {
                        patch.is_phone_verified = Some(true);
                    }
                }
                _ => return Err(invalid_otp()),
            }
        }

        // Commit point. Losing this race means another attempt spent the
        // code first.
        if !self.otps.mark_used(otp.id).await? {
            return Err(invalid_otp());
        }

        let user = if patch.is_email_verified.is_some() || patch.is_phone_verified.is_some() {
            self.users.update(user.id, patch).await?
        } else {
            user
        };

        Ok(ConsumedOtp { otp, user })
    }

    /// Invalidate any unused codes of `purpose` for the identified user and
    /// issue a fresh one over the same channel.
    pub async fn resend(
        &self,
        channel: DeliveryChannel,
        purpose: OtpPurpose,
    ) -> Result<Uuid, AppError> {
        let user = match &channel {
            DeliveryChannel::Sms(phone) => {
                self.users.find_by_phone(&normalize_phone(phone)).await?
            }
            DeliveryChannel::Email(email) => {
                self.users.find_by_email(&normalize_email(email)).await?
            }
        };

        let user = user
            .filter(|u| !u.is_deleted)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        self.otps
            .invalidate_unused_for_user(user.id, purpose)
            .await?;

        self.issue(user.id, purpose, channel).await
    }
}

/// Six digits, uniform over the full range including leading-zero-free
/// space: [100000, 999999].
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}
