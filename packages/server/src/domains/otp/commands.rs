use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::otp::OtpPurpose;

/// Delivery job payload consumed by the OTP delivery worker.
///
/// Exactly one of `email`/`phone` is set; it selects the channel. The
/// plaintext code lives only here and in the sender call - it is never
/// persisted outside the job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOtpCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub code: String,
    pub purpose: OtpPurpose,
    pub user_id: Uuid,
    pub otp_id: Uuid,
}

impl SendOtpCommand {
    pub const JOB_TYPE: &'static str = "send_otp";

    pub fn via_phone(phone: String, code: String, purpose: OtpPurpose, user_id: Uuid, otp_id: Uuid) -> Self {
        Self {
            email: None,
            phone: Some(phone),
            code,
            purpose,
            user_id,
            otp_id,
        }
    }

    pub fn via_email(email: String, code: String, purpose: OtpPurpose, user_id: Uuid, otp_id: Uuid) -> Self {
        Self {
            email: Some(email),
            phone: None,
            code,
            purpose,
            user_id,
            otp_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape_matches_worker_contract() {
        let cmd = SendOtpCommand::via_phone(
            "+14155551234".to_string(),
            "123456".to_string(),
            OtpPurpose::Login,
            Uuid::new_v4(),
            Uuid::new_v4(),
        );

        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["phone"], "+14155551234");
        assert_eq!(value["purpose"], "login");
        assert!(value.get("email").is_none());
    }
}
