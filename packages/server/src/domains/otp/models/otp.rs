use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::AppError;

/// What an OTP authorizes once verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpPurpose {
    Login,
    Reset,
    Verify,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Reset => "reset",
            OtpPurpose::Verify => "verify",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "login" => Ok(OtpPurpose::Login),
            "reset" => Ok(OtpPurpose::Reset),
            "verify" => Ok(OtpPurpose::Verify),
            other => Err(AppError::Validation(format!(
                "Unknown OTP purpose: {}",
                other
            ))),
        }
    }
}

/// One-time code record - SQL persistence layer.
///
/// Only the hash of the code is stored; the plaintext exists transiently in
/// the delivery job payload. `used` is monotonic false -> true. Rows are
/// never deleted (audit trail); expired rows may be pruned out of band.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Otp {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl Otp {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// OTP Ledger interface.
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn insert(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Otp, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Otp>, AppError>;

    /// Atomic consumption: flips `used` only when it is still false.
    /// Returning false means another verification attempt won the race (or
    /// the code was already spent) - callers must treat that as failure.
    async fn mark_used(&self, id: Uuid) -> Result<bool, AppError>;

    /// Unconditional invalidation (compensation for enqueue/delivery
    /// failures).
    async fn invalidate(&self, id: Uuid) -> Result<(), AppError>;

    /// Invalidate every unused OTP of `purpose` for the user. Keeps at most
    /// one usable OTP per purpose per user after a resend.
    async fn invalidate_unused_for_user(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<u64, AppError>;
}

/// Postgres-backed OTP ledger.
pub struct PostgresOtpStore {
    pool: PgPool,
}

impl PostgresOtpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for PostgresOtpStore {
    async fn insert(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Otp, AppError> {
        sqlx::query_as::<_, Otp>(
            "INSERT INTO otps (id, user_id, purpose, code_hash, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(purpose.as_str())
        .bind(code_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Otp>, AppError> {
        sqlx::query_as::<_, Otp>("SELECT * FROM otps WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn mark_used(&self, id: Uuid) -> Result<bool, AppError> {
        // The conditional update is the commit point for single use; zero
        // rows affected means the code was already spent.
        let result = sqlx::query(
            "UPDATE otps SET used = TRUE
             WHERE id = $1 AND used = FALSE AND expires_at > NOW()",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE otps SET used = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn invalidate_unused_for_user(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE otps SET used = TRUE
             WHERE user_id = $1 AND purpose = $2 AND used = FALSE",
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_roundtrip() {
        for purpose in [OtpPurpose::Login, OtpPurpose::Reset, OtpPurpose::Verify] {
            assert_eq!(OtpPurpose::parse(purpose.as_str()).unwrap(), purpose);
        }
        assert!(OtpPurpose::parse("signup").is_err());
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let otp = Otp {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            purpose: "login".to_string(),
            code_hash: "hash".to_string(),
            expires_at: now - chrono::Duration::seconds(1),
            used: false,
            created_at: now - chrono::Duration::minutes(5),
        };
        assert!(otp.is_expired(now));
        assert!(!otp.is_expired(now - chrono::Duration::minutes(2)));
    }
}
