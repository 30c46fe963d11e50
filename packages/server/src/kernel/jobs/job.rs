//! Delivery job persistence.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL-backed job for background OTP delivery.
///
/// Lifecycle: pending -> running -> succeeded | pending (retry, with
/// backoff) | dead_letter (retries exhausted).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub status: String,
    pub job_type: String,
    pub args: serde_json::Value,
    pub retry_count: i32,
    pub max_retries: i32,
    pub next_run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job for immediate execution.
    pub fn new(job_type: String, args: serde_json::Value, max_retries: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: "pending".to_string(),
            job_type,
            args,
            retry_count: 0,
            max_retries,
            next_run_at: now,
            last_error: None,
            dead_lettered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Insert the job into the database.
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Job>(
            "INSERT INTO jobs (
                id, status, job_type, args, retry_count, max_retries,
                next_run_at, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(self.id)
        .bind(&self.status)
        .bind(&self.job_type)
        .bind(&self.args)
        .bind(self.retry_count)
        .bind(self.max_retries)
        .bind(self.next_run_at)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await?;

        Ok(job)
    }

    /// Claim up to `limit` ready jobs, concurrent-safe via
    /// `FOR UPDATE SKIP LOCKED`.
    pub async fn claim(limit: i64, pool: &PgPool) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            "UPDATE jobs SET status = 'running', updated_at = NOW()
             WHERE id IN (
                 SELECT id FROM jobs
                 WHERE status = 'pending' AND next_run_at <= NOW()
                 ORDER BY next_run_at
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING *",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(jobs)
    }

    pub async fn mark_succeeded(id: Uuid, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'succeeded', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Re-queue for retry at `retry_at`.
    pub async fn mark_for_retry(
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET
                status = 'pending',
                retry_count = retry_count + 1,
                next_run_at = $2,
                last_error = $3,
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(retry_at)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn mark_dead_letter(id: Uuid, error: &str, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET
                status = 'dead_letter',
                last_error = $2,
                dead_lettered_at = NOW(),
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Bounded job history: drop succeeded jobs older than one hour (keeping
    /// the most recent 100 for observability) and dead-lettered jobs older
    /// than a day.
    pub async fn prune_history(pool: &PgPool) -> Result<u64> {
        let succeeded = sqlx::query(
            "DELETE FROM jobs
             WHERE status = 'succeeded'
               AND updated_at < NOW() - INTERVAL '1 hour'
               AND id NOT IN (
                   SELECT id FROM jobs WHERE status = 'succeeded'
                   ORDER BY updated_at DESC LIMIT 100
               )",
        )
        .execute(pool)
        .await?;

        let dead = sqlx::query(
            "DELETE FROM jobs
             WHERE status = 'dead_letter'
               AND dead_lettered_at < NOW() - INTERVAL '24 hours'",
        )
        .execute(pool)
        .await?;

        Ok(succeeded.rows_affected() + dead.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new(
            "send_otp".to_string(),
            serde_json::json!({"code": "123456"}),
            3,
        );

        assert_eq!(job.status, "pending");
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
        assert!(job.next_run_at <= Utc::now());
    }
}
