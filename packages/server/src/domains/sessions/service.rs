//! Refresh-token session lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tracing::debug;
use uuid::Uuid;

use crate::common::AppError;
use crate::kernel::traits::SecretHasher;

use super::models::session::{NewSession, Session, SessionStore};

/// Bytes of entropy in the secret half of a refresh token.
const SECRET_LEN: usize = 64;

/// Result of minting a session: the plaintext compound token goes to the
/// client, the id goes into the access token's `jti`.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Context captured from the request at session creation.
#[derive(Debug, Clone, Default)]
pub struct DeviceContext {
    pub device_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

pub struct SessionService {
    store: Arc<dyn SessionStore>,
    hasher: Arc<dyn SecretHasher>,
    default_ttl_days: i64,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        hasher: Arc<dyn SecretHasher>,
        default_ttl_days: i64,
    ) -> Self {
        Self {
            store,
            hasher,
            default_ttl_days,
        }
    }

    /// Create a fresh session and return the plaintext compound token.
    ///
    /// Token format: `"<sessionId>.<secretHex>"`. The id half is a lookup
    /// key; only the secret half is sensitive and only its hash is stored.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        device: &DeviceContext,
        ttl_days: Option<i64>,
    ) -> Result<CreatedSession, AppError> {
        let ttl_days = ttl_days.unwrap_or(self.default_ttl_days);

        let mut secret_bytes = [0u8; SECRET_LEN];
        rand::rngs::OsRng.fill_bytes(&mut secret_bytes);
        let secret = hex::encode(secret_bytes);

        let id = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::days(ttl_days);

        let session = self
            .store
            .insert(NewSession {
                id,
                user_id,
                device_id: device.device_id.clone(),
                token_hash: self.hasher.hash(&secret)?,
                ip: device.ip.clone(),
                user_agent: device.user_agent.clone(),
                expires_at,
            })
            .await?;

        debug!(session_id = %session.id, user_id = %user_id, "created refresh session");

        Ok(CreatedSession {
            session_id: session.id,
            refresh_token: format!("{}.{}", session.id, secret),
            expires_at: session.expires_at,
        })
    }

    /// Validate a compound refresh token.
    ///
    /// Malformed tokens are a client error; every other failure mode
    /// (unknown id, revoked, expired, secret mismatch) yields `Ok(None)` and
    /// the caller decides how to surface it. Expired-but-active rows are
    /// lazily revoked on the way out.
    pub async fn validate_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, AppError> {
        let (id, secret) = parse_refresh_token(token)?;

        let Some(session) = self.store.find_by_id(id).await? else {
            return Ok(None);
        };
        if !session.is_active {
            return Ok(None);
        }
        if session.is_expired(Utc::now()) {
            // Lazy cleanup, no background sweep
            self.store.deactivate(session.id).await?;
            return Ok(None);
        }
        if !self.hasher.verify(secret, &session.token_hash) {
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Liveness check for the auth gate (`jti` claim).
    pub async fn is_session_active(&self, session_id: Uuid) -> Result<bool, AppError> {
        let Some(session) = self.store.find_by_id(session_id).await? else {
            return Ok(false);
        };
        if !session.is_active {
            return Ok(false);
        }
        if session.is_expired(Utc::now()) {
            self.store.deactivate(session.id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn revoke_by_id(&self, session_id: Uuid) -> Result<(), AppError> {
        self.store.deactivate(session_id).await?;
        Ok(())
    }

    /// Revoke via the compound token. Malformed tokens are ignored - there
    /// is nothing to revoke.
    pub async fn revoke_by_refresh_token(&self, token: &str) -> Result<(), AppError> {
        if let Ok((id, _)) = parse_refresh_token(token) {
            self.store.deactivate(id).await?;
        }
        Ok(())
    }

    /// All-device revocation (logout).
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        self.store.deactivate_all_for_user(user_id).await
    }

    /// Rotation-on-use: the old session becomes strictly unusable before the
    /// replacement is issued.
    pub async fn rotate(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        device: &DeviceContext,
    ) -> Result<CreatedSession, AppError> {
        self.store.deactivate(session_id).await?;
        self.create_session(user_id, device, None).await
    }
}

/// Split a compound token into (session id, secret hex).
fn parse_refresh_token(token: &str) -> Result<(Uuid, &str), AppError> {
    let mut parts = token.split('.');
    let (Some(id), Some(secret), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AppError::Validation("Malformed token".to_string()));
    };
    let id = Uuid::parse_str(id)
        .map_err(|_| AppError::Validation("Malformed token".to_string()))?;
    Ok((id, secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refresh_token() {
        let id = Uuid::new_v4();
        let token = format!("{}.abcdef0123", id);
        let (parsed_id, secret) = parse_refresh_token(&token).unwrap();
        assert_eq!(parsed_id, id);
        assert_eq!(secret, "abcdef0123");
    }

    #[test]
    fn test_parse_rejects_wrong_part_count() {
        assert!(parse_refresh_token("justonepart").is_err());
        assert!(parse_refresh_token("a.b.c").is_err());
        assert!(parse_refresh_token("not-a-uuid.secret").is_err());
    }
}
