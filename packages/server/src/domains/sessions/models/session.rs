use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::AppError;

/// Refresh-token session record - SQL persistence layer.
///
/// The token the client holds is `"<id>.<secretHex>"`; only the argon2 hash
/// of the secret half is stored. Revocation is always soft (`is_active =
/// false`) - rows are kept for audit.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: Option<String>,
    pub token_hash: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Fields for creating a session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: Option<String>,
    pub token_hash: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Session Store interface.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: NewSession) -> Result<Session, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, AppError>;

    /// Soft revocation. Returns false when no row matched.
    async fn deactivate(&self, id: Uuid) -> Result<bool, AppError>;

    /// Revoke every session of the user. Returns the number of rows flipped.
    async fn deactivate_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;
}

/// Postgres-backed session store.
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn insert(&self, session: NewSession) -> Result<Session, AppError> {
        sqlx::query_as::<_, Session>(
            "INSERT INTO user_sessions (
                id, user_id, device_id, token_hash, ip, user_agent, expires_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.device_id)
        .bind(&session.token_hash)
        .bind(&session.ip)
        .bind(&session.user_agent)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        sqlx::query_as::<_, Session>("SELECT * FROM user_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE user_sessions SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result =
            sqlx::query("UPDATE user_sessions SET is_active = FALSE WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
