//! Trait abstractions for external capabilities.
//!
//! All collaborators with a network or crypto dependency sit behind these
//! traits so tests can substitute in-memory implementations.

use anyhow::Result;
use async_trait::async_trait;

/// Sends a text message to a phone number (E.164).
#[async_trait]
pub trait BaseSmsSender: Send + Sync {
    async fn send(&self, phone: &str, body: &str) -> Result<()>;
}

/// Sends an email to a recipient address.
#[async_trait]
pub trait BaseEmailSender: Send + Sync {
    async fn send(&self, email: &str, subject: &str, body: &str) -> Result<()>;
}

/// One-way hashing for low-entropy secrets (passwords, OTP codes) and
/// refresh-token secrets. Verification is constant time.
pub trait SecretHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String>;
    fn verify(&self, secret: &str, hash: &str) -> bool;
}

/// Identity extracted from a verified social provider token.
#[derive(Debug, Clone)]
pub struct SocialIdentity {
    pub provider_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
}

/// Verifies an opaque identity token against the configured audience and
/// produces the claims the orchestrator needs. Verification failure is an
/// opaque invalid-token condition.
#[async_trait]
pub trait BaseSocialTokenVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<SocialIdentity>;
}
