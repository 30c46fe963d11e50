use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access token claims.
///
/// `jti` carries the refresh-session id so the auth gate can check the
/// session is still alive without a token blacklist.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    pub sub: String, // user id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub jti: String, // session id
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// Password-reset token claims. Single use is enforced by comparing `iat`
/// against the user's `last_password_reset_at` watermark, not by a
/// revocation list.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResetClaims {
    pub sub: String,
    pub email: String,
    pub purpose: String, // always "password-reset"
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

pub const RESET_PURPOSE: &str = "password-reset";

/// JWT Service - creates and verifies JWT tokens
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl_minutes: i64,
}

impl JwtService {
    pub fn new(secret: &str, issuer: String, access_ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            access_ttl_minutes,
        }
    }

    /// Mint a short-lived access token bound to a refresh session.
    pub fn create_access_token(
        &self,
        user_id: Uuid,
        email: Option<String>,
        phone: Option<String>,
        session_id: Uuid,
    ) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::minutes(self.access_ttl_minutes);

        let claims = AccessClaims {
            sub: user_id.to_string(),
            email,
            phone,
            jti: session_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify and decode an access token.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }

    /// Mint a password-reset token, valid for `ttl_minutes`.
    pub fn create_reset_token(
        &self,
        user_id: Uuid,
        email: &str,
        ttl_minutes: i64,
    ) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::minutes(ttl_minutes);

        let claims = ResetClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            purpose: RESET_PURPOSE.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    pub fn verify_reset_token(&self, token: &str) -> Result<ResetClaims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<ResetClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)?;

        if claims.purpose != RESET_PURPOSE {
            anyhow::bail!("wrong token purpose");
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new("test_secret_key", "test_issuer".to_string(), 15)
    }

    #[test]
    fn test_create_and_verify_access_token() {
        let service = service();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let token = service
            .create_access_token(
                user_id,
                Some("alice@example.com".to_string()),
                None,
                session_id,
            )
            .unwrap();

        let claims = service.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.jti, session_id.to_string());
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
        assert_eq!(claims.iss, "test_issuer");
    }

    #[test]
    fn test_invalid_token() {
        let result = service().verify_access_token("invalid_token");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let service1 = JwtService::new("secret1", "test_issuer".to_string(), 15);
        let service2 = JwtService::new("secret2", "test_issuer".to_string(), 15);

        let token = service1
            .create_access_token(Uuid::new_v4(), None, None, Uuid::new_v4())
            .unwrap();

        assert!(service2.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_access_token_expiry_window() {
        let service = service();
        let token = service
            .create_access_token(Uuid::new_v4(), None, None, Uuid::new_v4())
            .unwrap();

        let claims = service.verify_access_token(&token).unwrap();
        let now = chrono::Utc::now().timestamp();
        let expires_in = claims.exp - now;
        assert!(expires_in > 14 * 60);
        assert!(expires_in <= 15 * 60);
    }

    #[test]
    fn test_reset_token_roundtrip() {
        let service = service();
        let user_id = Uuid::new_v4();

        let token = service
            .create_reset_token(user_id, "alice@example.com", 10)
            .unwrap();

        let claims = service.verify_reset_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.purpose, RESET_PURPOSE);
    }

    #[test]
    fn test_reset_token_rejected_as_access_token() {
        let service = service();
        let token = service
            .create_reset_token(Uuid::new_v4(), "alice@example.com", 10)
            .unwrap();

        // Missing jti claim, must not pass the access-token path
        assert!(service.verify_access_token(&token).is_err());
    }
}
