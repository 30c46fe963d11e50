use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::AppError;
use crate::domains::otp::commands::SendOtpCommand;
use crate::kernel::jobs::Job;

pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Enqueue surface for OTP delivery. Services depend on this trait so
/// tests can substitute an in-memory queue.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    /// Persist a delivery job. Returns the job id.
    async fn enqueue(&self, command: SendOtpCommand) -> Result<Uuid, AppError>;
}

pub struct PostgresDeliveryQueue {
    pool: PgPool,
    max_retries: i32,
}

impl PostgresDeliveryQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[async_trait]
impl DeliveryQueue for PostgresDeliveryQueue {
    async fn enqueue(&self, command: SendOtpCommand) -> Result<Uuid, AppError> {
        let args = serde_json::to_value(&command)
            .map_err(|e| AppError::Internal(e.into()))?;

        let job = Job::new(SendOtpCommand::JOB_TYPE.to_string(), args, self.max_retries)
            .insert(&self.pool)
            .await
            .map_err(AppError::Internal)?;

        tracing::debug!(job_id = %job.id, otp_id = %command.otp_id, "enqueued OTP delivery job");

        Ok(job.id)
    }
}
