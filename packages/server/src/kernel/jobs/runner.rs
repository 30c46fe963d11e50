//! Background runner for OTP delivery jobs.
//!
//! The `JobRunner` polls the `jobs` table, deserializes each claimed job
//! into a `SendOtpCommand`, and delivers it over SMS or email. Failed
//! deliveries are retried with exponential backoff; when retries are
//! exhausted the job is dead-lettered and the underlying OTP is
//! invalidated so a stale code can never be verified later.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domains::otp::commands::SendOtpCommand;
use crate::domains::otp::OtpPurpose;
use crate::kernel::jobs::Job;
use crate::kernel::traits::{BaseEmailSender, BaseSmsSender};
use crate::domains::otp::OtpStore;

/// Configuration for the job runner.
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// Maximum number of jobs to claim at once
    pub batch_size: i64,
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// How often to prune finished job history
    pub prune_interval: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            prune_interval: Duration::from_secs(300),
            worker_id: format!("runner-{}", Uuid::new_v4()),
        }
    }
}

/// Background service that delivers queued OTPs.
pub struct JobRunner {
    pool: PgPool,
    sms: Arc<dyn BaseSmsSender>,
    email: Arc<dyn BaseEmailSender>,
    otps: Arc<dyn OtpStore>,
    config: JobRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(
        pool: PgPool,
        sms: Arc<dyn BaseSmsSender>,
        email: Arc<dyn BaseEmailSender>,
        otps: Arc<dyn OtpStore>,
    ) -> Self {
        Self {
            pool,
            sms,
            email,
            otps,
            config: JobRunnerConfig::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(mut self, config: JobRunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Get a shutdown handle for graceful shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run the job runner until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "job runner starting"
        );

        let mut last_prune = std::time::Instant::now();

        loop {
            if self.is_shutdown_requested() {
                break;
            }

            if last_prune.elapsed() >= self.config.prune_interval {
                match Job::prune_history(&self.pool).await {
                    Ok(pruned) if pruned > 0 => {
                        debug!(pruned, "pruned job history");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "failed to prune job history"),
                }
                last_prune = std::time::Instant::now();
            }

            let jobs = match Job::claim(self.config.batch_size, &self.pool).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            debug!(count = jobs.len(), "claimed jobs");

            for job in jobs {
                if self.is_shutdown_requested() {
                    break;
                }
                self.process(job).await;
            }
        }

        info!(worker_id = %self.config.worker_id, "job runner stopped");
        Ok(())
    }

    /// Run until a Ctrl+C signal is received.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown_handle();

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        });

        self.run().await
    }

    async fn process(&self, job: Job) {
        let job_id = job.id;
        debug!(job_id = %job_id, job_type = %job.job_type, "executing job");

        match self.execute(&job).await {
            Ok(()) => {
                info!(job_id = %job_id, "job succeeded");
                if let Err(e) = Job::mark_succeeded(job_id, &self.pool).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as succeeded");
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "job failed");
                self.handle_failure(&job, &e).await;
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<()> {
        if job.job_type != SendOtpCommand::JOB_TYPE {
            return Err(anyhow!("unknown job type: {}", job.job_type));
        }

        let command: SendOtpCommand = serde_json::from_value(job.args.clone())?;
        deliver(&command, self.sms.as_ref(), self.email.as_ref()).await
    }

    async fn handle_failure(&self, job: &Job, error: &anyhow::Error) {
        // retry_count counts completed attempts; the row just ran once more
        let attempts = job.retry_count + 1;

        if attempts >= job.max_retries {
            if let Err(e) = Job::mark_dead_letter(job.id, &error.to_string(), &self.pool).await {
                error!(job_id = %job.id, error = %e, "failed to dead-letter job");
                return;
            }

            warn!(job_id = %job.id, attempts, "job dead-lettered, invalidating OTP");

            // The code was never delivered; make sure it can never verify.
            if let Ok(command) = serde_json::from_value::<SendOtpCommand>(job.args.clone()) {
                if let Err(e) = self.otps.invalidate(command.otp_id).await {
                    error!(otp_id = %command.otp_id, error = %e, "failed to invalidate undelivered OTP");
                }
            }
        } else {
            let retry_at = Utc::now() + chrono::Duration::seconds(backoff_seconds(job.retry_count));
            if let Err(e) =
                Job::mark_for_retry(job.id, &error.to_string(), retry_at, &self.pool).await
            {
                error!(job_id = %job.id, error = %e, "failed to schedule job retry");
            }
        }
    }
}

/// Deliver an OTP over the channel the command names.
pub async fn deliver(
    command: &SendOtpCommand,
    sms: &dyn BaseSmsSender,
    email: &dyn BaseEmailSender,
) -> Result<()> {
    let body = otp_message(&command.code, command.purpose);

    if let Some(phone) = &command.phone {
        sms.send(phone, &body).await
    } else if let Some(to) = &command.email {
        email.send(to, otp_subject(command.purpose), &body).await
    } else {
        Err(anyhow!("delivery command has neither phone nor email"))
    }
}

/// Exponential backoff: 2s, 4s, 8s, ...
fn backoff_seconds(retry_count: i32) -> i64 {
    2i64 << retry_count.min(30)
}

fn otp_subject(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::Reset => "Your password reset code",
        _ => "Your verification code",
    }
}

fn otp_message(code: &str, purpose: OtpPurpose) -> String {
    match purpose {
        OtpPurpose::Login => {
            format!("{code} is your login code. It expires in 5 minutes.")
        }
        OtpPurpose::Reset => {
            format!("{code} is your password reset code. It expires in 10 minutes.")
        }
        OtpPurpose::Verify => {
            format!("{code} is your verification code. It expires in 5 minutes.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_seconds(0), 2);
        assert_eq!(backoff_seconds(1), 4);
        assert_eq!(backoff_seconds(2), 8);
    }

    #[test]
    fn test_otp_message_mentions_code() {
        let msg = otp_message("123456", OtpPurpose::Login);
        assert!(msg.contains("123456"));
        assert!(msg.contains("login"));
    }
}
