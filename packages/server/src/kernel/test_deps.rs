// In-memory implementations of the store and sender traits for tests.
//
// These live in the library (not behind cfg(test)) so integration tests in
// tests/ can construct services without a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::common::AppError;
use crate::domains::otp::commands::SendOtpCommand;
use crate::domains::otp::{Otp, OtpPurpose, OtpStore};
use crate::domains::sessions::{NewSession, Session, SessionStore};
use crate::domains::users::{NewUser, ProfileFields, User, UserPatch, UserStore};
use crate::kernel::jobs::DeliveryQueue;
use crate::kernel::traits::{
    BaseEmailSender, BaseSmsSender, BaseSocialTokenVerifier, SecretHasher, SocialIdentity,
};

// =============================================================================
// Hasher
// =============================================================================

/// Deterministic stand-in for Argon2 so tests stay fast.
pub struct MockHasher;

impl SecretHasher for MockHasher {
    fn hash(&self, secret: &str) -> Result<String> {
        Ok(format!("hashed:{secret}"))
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        hash == format!("hashed:{secret}")
    }
}

// =============================================================================
// User store
// =============================================================================

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user directly, bypassing uniqueness checks.
    pub fn seed(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    /// How many records carry this email. More than one means a
    /// uniqueness invariant broke somewhere.
    pub fn count_with_email(&self, email: &str) -> usize {
        self.users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.email.as_deref() == Some(email))
            .count()
    }

    /// Synchronous phone lookup for assertions; panics when absent.
    pub fn find_by_phone_sync(&self, phone: &str) -> User {
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.phone.as_deref() == Some(phone))
            .cloned()
            .expect("no user with that phone")
    }
}

/// Bare user record for seeding tests.
pub fn test_user(provider: &str) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        name: None,
        email: None,
        phone: None,
        password_hash: None,
        provider: provider.to_string(),
        provider_id: None,
        is_email_verified: false,
        is_phone_verified: false,
        is_deleted: false,
        profile_completed: false,
        is_advisor: false,
        terms_accepted_at: None,
        last_login_at: None,
        last_password_reset_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn find_by_provider_id(
        &self,
        provider: crate::domains::users::AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.provider == provider.as_str() && u.provider_id.as_deref() == Some(provider_id))
            .cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();

        let conflict = users.values().any(|u| {
            (new_user.email.is_some() && u.email == new_user.email)
                || (new_user.phone.is_some() && u.phone == new_user.phone)
        });
        if conflict {
            return Err(AppError::Conflict(
                "An account with this email or phone already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            phone: new_user.phone,
            password_hash: new_user.password_hash,
            provider: new_user.provider.as_str().to_string(),
            provider_id: new_user.provider_id,
            is_email_verified: new_user.is_email_verified,
            is_phone_verified: false,
            is_deleted: false,
            profile_completed: false,
            is_advisor: false,
            terms_accepted_at: None,
            last_login_at: None,
            last_password_reset_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if let Some(name) = patch.name {
            user.name = Some(name);
        }
        if let Some(email) = patch.email {
            user.email = Some(email);
        }
        if let Some(phone) = patch.phone {
            user.phone = Some(phone);
        }
        if let Some(password_hash) = patch.password_hash {
            user.password_hash = Some(password_hash);
        }
        if let Some(provider_id) = patch.provider_id {
            user.provider_id = Some(provider_id);
        }
        if let Some(v) = patch.is_email_verified {
            user.is_email_verified = v;
        }
        if let Some(v) = patch.is_phone_verified {
            user.is_phone_verified = v;
        }
        if let Some(t) = patch.last_login_at {
            user.last_login_at = Some(t);
        }
        if let Some(t) = patch.last_password_reset_at {
            user.last_password_reset_at = Some(t);
        }
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn complete_profile(&self, id: Uuid, fields: ProfileFields) -> Result<bool, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if user.profile_completed {
            return Ok(false);
        }

        user.name = Some(fields.name);
        if let Some(email) = fields.email {
            user.email = Some(email);
        }
        if let Some(phone) = fields.phone {
            user.phone = Some(phone);
        }
        user.is_advisor = fields.is_advisor;
        user.profile_completed = true;
        user.terms_accepted_at = Some(Utc::now());
        user.updated_at = Utc::now();

        Ok(true)
    }
}

// =============================================================================
// OTP store
// =============================================================================

#[derive(Default)]
pub struct MemoryOtpStore {
    otps: Mutex<HashMap<Uuid, Otp>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<Otp> {
        self.otps.lock().unwrap().get(&id).cloned()
    }

    /// Force an OTP into the expired state.
    pub fn expire(&self, id: Uuid) {
        if let Some(otp) = self.otps.lock().unwrap().get_mut(&id) {
            otp.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    pub fn all_for_user(&self, user_id: Uuid) -> Vec<Otp> {
        self.otps
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn insert(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Otp, AppError> {
        let otp = Otp {
            id: Uuid::new_v4(),
            user_id,
            purpose: purpose.as_str().to_string(),
            code_hash: code_hash.to_string(),
            expires_at,
            used: false,
            created_at: Utc::now(),
        };
        self.otps.lock().unwrap().insert(otp.id, otp.clone());
        Ok(otp)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Otp>, AppError> {
        Ok(self.otps.lock().unwrap().get(&id).cloned())
    }

    async fn mark_used(&self, id: Uuid) -> Result<bool, AppError> {
        let mut otps = self.otps.lock().unwrap();
        match otps.get_mut(&id) {
            Some(otp) if !otp.used => {
                otp.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(otp) = self.otps.lock().unwrap().get_mut(&id) {
            otp.used = true;
        }
        Ok(())
    }

    async fn invalidate_unused_for_user(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<u64, AppError> {
        let mut count = 0;
        for otp in self.otps.lock().unwrap().values_mut() {
            if otp.user_id == user_id && otp.purpose == purpose.as_str() && !otp.used {
                otp.used = true;
                count += 1;
            }
        }
        Ok(count)
    }
}

// =============================================================================
// Session store
// =============================================================================

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.lock().unwrap().get(&id).cloned()
    }

    pub fn active_count_for(&self, user_id: Uuid) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id && s.is_active)
            .count()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, new_session: NewSession) -> Result<Session, AppError> {
        let session = Session {
            id: new_session.id,
            user_id: new_session.user_id,
            device_id: new_session.device_id,
            token_hash: new_session.token_hash,
            ip: new_session.ip,
            user_agent: new_session.user_agent,
            is_active: true,
            expires_at: new_session.expires_at,
            created_at: Utc::now(),
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        Ok(self.sessions.lock().unwrap().get(&id).cloned())
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, AppError> {
        match self.sessions.lock().unwrap().get_mut(&id) {
            Some(session) => {
                session.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut count = 0;
        for session in self.sessions.lock().unwrap().values_mut() {
            if session.user_id == user_id && session.is_active {
                session.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }
}

// =============================================================================
// Delivery queue
// =============================================================================

#[derive(Default)]
pub struct MemoryDeliveryQueue {
    commands: Mutex<Vec<SendOtpCommand>>,
    fail_next: Mutex<bool>,
}

impl MemoryDeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next enqueue fail, simulating a queue outage.
    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    pub fn commands(&self) -> Vec<SendOtpCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Plaintext code of the most recently enqueued command.
    pub fn last_code(&self) -> Option<String> {
        self.commands
            .lock()
            .unwrap()
            .last()
            .map(|c| c.code.clone())
    }

    pub fn last_otp_id(&self) -> Option<Uuid> {
        self.commands.lock().unwrap().last().map(|c| c.otp_id)
    }
}

#[async_trait]
impl DeliveryQueue for MemoryDeliveryQueue {
    async fn enqueue(&self, command: SendOtpCommand) -> Result<Uuid, AppError> {
        let mut fail = self.fail_next.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(AppError::Dependency("queue unavailable".to_string()));
        }
        drop(fail);

        self.commands.lock().unwrap().push(command);
        Ok(Uuid::new_v4())
    }
}

// =============================================================================
// Senders
// =============================================================================

#[derive(Default)]
pub struct MockSmsSender {
    calls: Mutex<Vec<(String, String)>>,
    fail: Mutex<bool>,
}

impl MockSmsSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseSmsSender for MockSmsSender {
    async fn send(&self, phone: &str, body: &str) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(anyhow!("sms provider unreachable"));
        }
        self.calls
            .lock()
            .unwrap()
            .push((phone.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockEmailSender {
    calls: Mutex<Vec<(String, String, String)>>,
    fail: Mutex<bool>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseEmailSender for MockEmailSender {
    async fn send(&self, email: &str, subject: &str, body: &str) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(anyhow!("email provider unreachable"));
        }
        self.calls
            .lock()
            .unwrap()
            .push((email.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

// =============================================================================
// Social token verifier
// =============================================================================

#[derive(Default)]
pub struct MockSocialTokenVerifier {
    identities: Mutex<HashMap<String, SocialIdentity>>,
}

impl MockSocialTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token that will verify to the given identity.
    pub fn with_identity(self, token: &str, identity: SocialIdentity) -> Self {
        self.identities
            .lock()
            .unwrap()
            .insert(token.to_string(), identity);
        self
    }
}

#[async_trait]
impl BaseSocialTokenVerifier for MockSocialTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<SocialIdentity> {
        self.identities
            .lock()
            .unwrap()
            .get(id_token)
            .cloned()
            .ok_or_else(|| anyhow!("invalid identity token"))
    }
}

pub struct TestStores {
    pub users: Arc<MemoryUserStore>,
    pub otps: Arc<MemoryOtpStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub queue: Arc<MemoryDeliveryQueue>,
}

impl TestStores {
    pub fn new() -> Self {
        Self {
            users: Arc::new(MemoryUserStore::new()),
            otps: Arc::new(MemoryOtpStore::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            queue: Arc::new(MemoryDeliveryQueue::new()),
        }
    }
}

impl Default for TestStores {
    fn default() -> Self {
        Self::new()
    }
}
