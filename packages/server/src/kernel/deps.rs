//! Server dependency container.
//!
//! Every external collaborator sits behind a trait so services can be
//! constructed with in-memory substitutes in tests. Production wiring
//! happens once at process start in `server::main`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use twilio::TwilioService;

use crate::domains::auth::JwtService;
use crate::domains::otp::OtpStore;
use crate::domains::sessions::SessionStore;
use crate::domains::users::UserStore;
use crate::kernel::jobs::DeliveryQueue;
use crate::kernel::traits::{BaseEmailSender, BaseSmsSender, BaseSocialTokenVerifier, SecretHasher};

/// Wrapper around TwilioService that implements the SMS sender trait.
pub struct TwilioSmsAdapter(pub Arc<TwilioService>);

impl TwilioSmsAdapter {
    pub fn new(service: Arc<TwilioService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseSmsSender for TwilioSmsAdapter {
    async fn send(&self, phone: &str, body: &str) -> Result<()> {
        self.0
            .send_sms(phone, body)
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("{}", e))
    }
}

/// SMS sender for environments without Twilio credentials. Logs the
/// recipient only; the message body is never written to the log.
pub struct LogSmsSender;

#[async_trait]
impl BaseSmsSender for LogSmsSender {
    async fn send(&self, phone: &str, _body: &str) -> Result<()> {
        tracing::info!(to = %phone, "SMS transport disabled, dropping message");
        Ok(())
    }
}

/// Email sender for environments without an email provider configured.
pub struct LogEmailSender;

#[async_trait]
impl BaseEmailSender for LogEmailSender {
    async fn send(&self, email: &str, subject: &str, _body: &str) -> Result<()> {
        tracing::info!(to = %email, subject = %subject, "email transport disabled, dropping message");
        Ok(())
    }
}

/// Server dependencies accessible to services (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub users: Arc<dyn UserStore>,
    pub otps: Arc<dyn OtpStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub queue: Arc<dyn DeliveryQueue>,
    pub hasher: Arc<dyn SecretHasher>,
    pub sms: Arc<dyn BaseSmsSender>,
    pub email: Arc<dyn BaseEmailSender>,
    /// Google identity-token verifier. `None` disables social login.
    pub google_verifier: Option<Arc<dyn BaseSocialTokenVerifier>>,
    pub jwt_service: Arc<JwtService>,
    /// When false, the auth gate skips the live-session check on `jti`.
    pub session_validation_enabled: bool,
}

impl ServerDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: PgPool,
        users: Arc<dyn UserStore>,
        otps: Arc<dyn OtpStore>,
        sessions: Arc<dyn SessionStore>,
        queue: Arc<dyn DeliveryQueue>,
        hasher: Arc<dyn SecretHasher>,
        sms: Arc<dyn BaseSmsSender>,
        email: Arc<dyn BaseEmailSender>,
        google_verifier: Option<Arc<dyn BaseSocialTokenVerifier>>,
        jwt_service: Arc<JwtService>,
        session_validation_enabled: bool,
    ) -> Self {
        Self {
            db_pool,
            users,
            otps,
            sessions,
            queue,
            hasher,
            sms,
            email,
            google_verifier,
            jwt_service,
            session_validation_enabled,
        }
    }
}
