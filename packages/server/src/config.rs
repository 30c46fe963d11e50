use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,

    // Token signing
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_ttl_minutes: i64,

    // OTP lifecycle
    pub otp_ttl_minutes: i64,
    pub reset_otp_ttl_minutes: i64,

    // Refresh sessions
    pub refresh_ttl_days: i64,
    /// When false the auth gate skips session-liveness checks (explicit,
    /// logged at startup).
    pub session_validation_enabled: bool,

    // Social login
    pub google_client_id: Option<String>,

    // SMS transport
    pub twilio_enabled: bool,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "advisor-api".to_string()),
            access_token_ttl_minutes: parse_i64("ACCESS_TOKEN_TTL_MINUTES", 15)?,
            otp_ttl_minutes: parse_i64("OTP_TTL_MINUTES", 5)?,
            reset_otp_ttl_minutes: parse_i64("RESET_OTP_TTL_MINUTES", 10)?,
            refresh_ttl_days: parse_i64("REFRESH_TTL_DAYS", 30)?,
            session_validation_enabled: env::var("SESSION_VALIDATION_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(true),
            google_client_id: env::var("GOOGLE_CLIENT_ID").ok(),
            twilio_enabled: env::var("TWILIO_ENABLED").map(|v| v == "true").unwrap_or(false),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").ok(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").ok(),
            twilio_from_number: env::var("TWILIO_PHONE_NUMBER").ok(),
        })
    }
}

fn parse_i64(name: &str, default: i64) -> Result<i64> {
    match env::var(name) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}
