use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::AppError;

/// How an account was first established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Phone,
    Email,
    Google,
    Apple,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Phone => "phone",
            AuthProvider::Email => "email",
            AuthProvider::Google => "google",
            AuthProvider::Apple => "apple",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "phone" => Ok(AuthProvider::Phone),
            "email" => Ok(AuthProvider::Email),
            "google" => Ok(AuthProvider::Google),
            "apple" => Ok(AuthProvider::Apple),
            other => Err(AppError::Validation(format!(
                "Unknown auth provider: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for AuthProvider {
    fn default() -> Self {
        AuthProvider::Phone
    }
}

/// User identity record - SQL persistence layer.
///
/// Exactly one of {email, phone, provider_id} identifies the account per
/// provider type; email and phone are globally unique when set (enforced by
/// the storage layer, which is the final race-resolution authority).
/// Rows are never hard-deleted; `is_deleted` is a soft flag.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub provider: String,
    pub provider_id: Option<String>,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,
    pub is_deleted: bool,
    pub profile_completed: bool,
    pub is_advisor: bool,
    pub terms_accepted_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_password_reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn provider(&self) -> Result<AuthProvider, AppError> {
        AuthProvider::parse(&self.provider)
    }
}

/// Fields for creating a new user record.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
    pub name: Option<String>,
    pub is_email_verified: bool,
}

/// Partial update. `None` fields are left untouched; updates never null out
/// an existing value (social-login backfill relies on this).
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub provider_id: Option<String>,
    pub is_email_verified: Option<bool>,
    pub is_phone_verified: Option<bool>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_password_reset_at: Option<DateTime<Utc>>,
}

/// Fields applied by the one-time profile-completion transition.
#[derive(Debug, Clone)]
pub struct ProfileFields {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_advisor: bool,
}

/// Credential Store interface.
///
/// The orchestrator reads and mutates identity records only through this
/// trait; the Postgres implementation is wired at process start.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, AppError>;
    async fn find_by_provider_id(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError>;

    /// Insert a new user. A unique-constraint violation on email/phone
    /// surfaces as `AppError::Conflict`.
    async fn create(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<User, AppError>;

    /// One-time transition: applies the profile fields, sets
    /// `profile_completed = true` and stamps `terms_accepted_at`, atomically
    /// guarded on `profile_completed = false`. Returns false when the guard
    /// did not match (already completed).
    async fn complete_profile(&self, id: Uuid, fields: ProfileFields)
        -> Result<bool, AppError>;
}

/// Postgres-backed credential store.
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("An account with this email or phone already exists".to_string())
        }
        _ => AppError::Internal(anyhow!(err)),
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn find_by_provider_id(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE provider = $1 AND provider_id = $2",
        )
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (
                id, name, email, phone, password_hash, provider, provider_id,
                is_email_verified
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.phone)
        .bind(&new_user.password_hash)
        .bind(new_user.provider.as_str())
        .bind(&new_user.provider_id)
        .bind(new_user.is_email_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                password_hash = COALESCE($5, password_hash),
                provider_id = COALESCE($6, provider_id),
                is_email_verified = COALESCE($7, is_email_verified),
                is_phone_verified = COALESCE($8, is_phone_verified),
                last_login_at = COALESCE($9, last_login_at),
                last_password_reset_at = COALESCE($10, last_password_reset_at),
                updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.email)
        .bind(&patch.phone)
        .bind(&patch.password_hash)
        .bind(&patch.provider_id)
        .bind(patch.is_email_verified)
        .bind(patch.is_phone_verified)
        .bind(patch.last_login_at)
        .bind(patch.last_password_reset_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)
    }

    async fn complete_profile(
        &self,
        id: Uuid,
        fields: ProfileFields,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET
                name = $2,
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                is_advisor = $5,
                profile_completed = TRUE,
                terms_accepted_at = NOW(),
                updated_at = NOW()
             WHERE id = $1 AND profile_completed = FALSE",
        )
        .bind(id)
        .bind(&fields.name)
        .bind(&fields.email)
        .bind(&fields.phone)
        .bind(fields.is_advisor)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(result.rows_affected() > 0)
    }
}
