//! Auth orchestrator.
//!
//! Entry point for every login flow. Credential lookups, OTP issuance,
//! session lifecycle, and token minting all run through the collaborators
//! passed in at construction; nothing here talks to the network or the
//! database directly.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::common::validation::{
    normalize_email, validate_complete_profile, validate_email, validate_login, validate_password,
    validate_phone, ValidatedLogin,
};
use crate::common::AppError;
use crate::domains::auth::jwt::JwtService;
use crate::domains::auth::types::*;
use crate::domains::otp::{ConsumedOtp, DeliveryChannel, OtpPurpose, OtpService};
use crate::domains::sessions::{CreatedSession, DeviceContext, SessionService};
use crate::domains::users::{AuthProvider, NewUser, ProfileFields, User, UserPatch, UserStore};
use crate::kernel::traits::{BaseSocialTokenVerifier, SecretHasher, SocialIdentity};

const RESET_SENT_MESSAGE: &str =
    "If an account exists for this email, a reset code has been sent";

pub struct AuthService {
    users: Arc<dyn UserStore>,
    otp_service: Arc<OtpService>,
    session_service: Arc<SessionService>,
    hasher: Arc<dyn SecretHasher>,
    jwt: Arc<JwtService>,
    google_verifier: Option<Arc<dyn BaseSocialTokenVerifier>>,
    reset_token_ttl_minutes: i64,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        otp_service: Arc<OtpService>,
        session_service: Arc<SessionService>,
        hasher: Arc<dyn SecretHasher>,
        jwt: Arc<JwtService>,
        google_verifier: Option<Arc<dyn BaseSocialTokenVerifier>>,
        reset_token_ttl_minutes: i64,
    ) -> Self {
        Self {
            users,
            otp_service,
            session_service,
            hasher,
            jwt,
            google_verifier,
            reset_token_ttl_minutes,
        }
    }

    /// Phone or email login.
    ///
    /// Phone always ends in an OTP challenge. Email ends in tokens when the
    /// account is verified and the password matches, otherwise in a fresh
    /// OTP challenge (new account or still-unverified email).
    pub async fn login(
        &self,
        request: LoginRequest,
        device: &DeviceContext,
    ) -> Result<LoginOutcome, AppError> {
        let provider = AuthProvider::parse(&request.provider)?;
        let validated = validate_login(
            provider,
            request.phone.as_deref(),
            request.email.as_deref(),
            request.password.as_deref(),
        )?;

        match validated {
            ValidatedLogin::Phone { phone } => {
                let user = match self.users.find_by_phone(&phone).await? {
                    Some(user) => not_deleted(user)?,
                    None => {
                        self.users
                            .create(NewUser {
                                phone: Some(phone.clone()),
                                provider: AuthProvider::Phone,
                                ..Default::default()
                            })
                            .await?
                    }
                };

                let otp_id = self
                    .otp_service
                    .issue(user.id, OtpPurpose::Login, DeliveryChannel::Sms(phone))
                    .await?;

                Ok(LoginOutcome::Challenge(OtpChallenge {
                    otp_id,
                    message: "Verification code sent to your phone".to_string(),
                }))
            }
            ValidatedLogin::Email { email, password } => {
                match self.users.find_by_email(&email).await? {
                    None => {
                        let password_hash = match &password {
                            Some(p) => {
                                validate_password(p)?;
                                Some(self.hasher.hash(p).map_err(AppError::Internal)?)
                            }
                            None => None,
                        };

                        let user = self
                            .users
                            .create(NewUser {
                                email: Some(email.clone()),
                                password_hash,
                                provider: AuthProvider::Email,
                                ..Default::default()
                            })
                            .await?;

                        self.email_challenge(user.id, email).await
                    }
                    Some(user) => {
                        let user = not_deleted(user)?;

                        if user.provider != AuthProvider::Email.as_str() {
                            return Err(AppError::Conflict(
                                "This email is registered with a different sign-in method"
                                    .to_string(),
                            ));
                        }

                        // Unverified accounts go back through the challenge
                        // instead of password auth.
                        if !user.is_email_verified {
                            return self.email_challenge(user.id, email).await;
                        }

                        if user.password_hash.is_none() {
                            return Err(AppError::Unauthorized(
                                "No password is set for this account; use password reset to create one"
                                    .to_string(),
                            ));
                        }

                        let valid = match (&password, &user.password_hash) {
                            (Some(supplied), Some(stored)) => self.hasher.verify(supplied, stored),
                            _ => false,
                        };
                        if !valid {
                            return Err(AppError::Unauthorized(
                                "Invalid credentials".to_string(),
                            ));
                        }

                        Ok(LoginOutcome::Tokens(
                            self.sign_tokens_for_user(user, device).await?,
                        ))
                    }
                }
            }
        }
    }

    async fn email_challenge(
        &self,
        user_id: Uuid,
        email: String,
    ) -> Result<LoginOutcome, AppError> {
        let otp_id = self
            .otp_service
            .issue(user_id, OtpPurpose::Login, DeliveryChannel::Email(email))
            .await?;

        Ok(LoginOutcome::Challenge(OtpChallenge {
            otp_id,
            message: "Verification code sent to your email".to_string(),
        }))
    }

    /// Social login. Google is supported; Apple is recognized but
    /// deliberately unimplemented.
    pub async fn social_login(
        &self,
        request: SocialLoginRequest,
        device: &DeviceContext,
    ) -> Result<TokenBundle, AppError> {
        let provider = AuthProvider::parse(&request.provider)?;

        match provider {
            AuthProvider::Google => {}
            AuthProvider::Apple => {
                return Err(AppError::NotImplemented(
                    "Apple login is not implemented yet".to_string(),
                ));
            }
            _ => {
                return Err(AppError::Validation(
                    "Unsupported social provider".to_string(),
                ));
            }
        }

        let verifier = self.google_verifier.as_ref().ok_or_else(|| {
            AppError::Dependency("Social login is not configured".to_string())
        })?;

        let identity = verifier
            .verify(&request.id_token)
            .await
            .map_err(|_| AppError::Unauthorized("Invalid identity token".to_string()))?;

        let user = self.resolve_social_user(identity).await?;
        self.sign_tokens_for_user(user, device).await
    }

    /// Resolution order: provider link, then email (backfilling the link),
    /// then a brand-new account. An email already claimed by another
    /// provider is a hard conflict.
    async fn resolve_social_user(&self, identity: SocialIdentity) -> Result<User, AppError> {
        if let Some(user) = self
            .users
            .find_by_provider_id(AuthProvider::Google, &identity.provider_id)
            .await?
        {
            let user = not_deleted(user)?;
            return self.backfill_social_fields(user, &identity).await;
        }

        if let Some(email) = &identity.email {
            let email = normalize_email(email);
            if let Some(user) = self.users.find_by_email(&email).await? {
                let user = not_deleted(user)?;
                if user.provider != AuthProvider::Google.as_str() {
                    return Err(AppError::Conflict(
                        "This email is registered with a different sign-in method".to_string(),
                    ));
                }
                return self.backfill_social_fields(user, &identity).await;
            }
        }

        self.users
            .create(NewUser {
                email: identity.email.as_deref().map(normalize_email),
                provider: AuthProvider::Google,
                provider_id: Some(identity.provider_id),
                name: identity.name,
                is_email_verified: identity.email_verified,
                ..Default::default()
            })
            .await
    }

    /// Fill in fields the provider just attested that we were missing;
    /// never overwrite an existing value.
    async fn backfill_social_fields(
        &self,
        user: User,
        identity: &SocialIdentity,
    ) -> Result<User, AppError> {
        let mut patch = UserPatch::default();

        if user.provider_id.is_none() {
            patch.provider_id = Some(identity.provider_id.clone());
        }
        if user.email.is_none() {
            patch.email = identity.email.as_deref().map(normalize_email);
        }
        if !user.is_email_verified && identity.email_verified {
            patch.is_email_verified = Some(true);
        }
        if user.name.is_none() {
            patch.name = identity.name.clone();
        }

        let unchanged = patch.provider_id.is_none()
            && patch.email.is_none()
            && patch.is_email_verified.is_none()
            && patch.name.is_none();
        if unchanged {
            return Ok(user);
        }

        self.users.update(user.id, patch).await
    }

    /// Verify an OTP. Login codes chain straight into session issuance;
    /// other purposes return `{userId, purpose}` for the caller's flow.
    pub async fn verify_otp(
        &self,
        request: VerifyOtpRequest,
        device: &DeviceContext,
    ) -> Result<VerifyOtpOutcome, AppError> {
        let ConsumedOtp { otp, user } = self
            .otp_service
            .consume(
                request.otp_id,
                &request.code,
                None,
                request.email.as_deref(),
                request.phone.as_deref(),
            )
            .await?;

        if otp.purpose == OtpPurpose::Login.as_str() {
            return Ok(VerifyOtpOutcome::Tokens(
                self.sign_tokens_for_user(user, device).await?,
            ));
        }

        Ok(VerifyOtpOutcome::Verified(VerifiedOtp {
            user_id: user.id,
            purpose: otp.purpose,
        }))
    }

    /// Invalidate outstanding codes and send a fresh one.
    pub async fn resend_otp(&self, request: ResendOtpRequest) -> Result<OtpChallenge, AppError> {
        let purpose = OtpPurpose::parse(&request.purpose)?;

        let channel = match request.channel.as_str() {
            "phone" => DeliveryChannel::Sms(validate_phone(&request.identifier)?),
            "email" => DeliveryChannel::Email(validate_email(&request.identifier)?),
            other => {
                return Err(AppError::Validation(format!(
                    "Unknown resend channel: {}",
                    other
                )))
            }
        };

        let otp_id = self.otp_service.resend(channel, purpose).await?;

        Ok(OtpChallenge {
            otp_id,
            message: "Verification code resent".to_string(),
        })
    }

    /// The convergence point for every successful authentication path:
    /// always a fresh session, access token `jti` bound to it, best-effort
    /// `last_login_at` stamp.
    pub async fn sign_tokens_for_user(
        &self,
        user: User,
        device: &DeviceContext,
    ) -> Result<TokenBundle, AppError> {
        let session = self
            .session_service
            .create_session(user.id, device, None)
            .await?;

        let user = match self
            .users
            .update(
                user.id,
                UserPatch {
                    last_login_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                // Stamping the login time must not fail the login.
                warn!(user_id = %user.id, error = %e, "failed to update last_login_at");
                user
            }
        };

        self.bundle(user, session)
    }

    fn bundle(&self, user: User, session: CreatedSession) -> Result<TokenBundle, AppError> {
        let access_token = self
            .jwt
            .create_access_token(
                user.id,
                user.email.clone(),
                user.phone.clone(),
                session.session_id,
            )
            .map_err(AppError::Internal)?;

        let profile_completion_required = !user.profile_completed;

        Ok(TokenBundle {
            access_token,
            refresh_token: session.refresh_token,
            refresh_expires_at: session.expires_at,
            user,
            profile_completion_required,
        })
    }

    /// Rotation-on-use refresh: the old session dies, a new one is born,
    /// and the old token is strictly unusable afterward.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: &DeviceContext,
    ) -> Result<TokenBundle, AppError> {
        let session = self
            .session_service
            .validate_refresh_token(refresh_token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .filter(|u| !u.is_deleted)
            .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

        let rotated = self
            .session_service
            .rotate(session.id, user.id, device)
            .await?;

        self.bundle(user, rotated)
    }

    /// All-device logout: revokes every session the user holds.
    pub async fn logout(&self, user_id: Uuid) -> Result<MessageResponse, AppError> {
        let revoked = self.session_service.revoke_all_for_user(user_id).await?;
        tracing::debug!(user_id = %user_id, revoked, "logout");

        Ok(MessageResponse {
            message: "Logged out".to_string(),
        })
    }

    /// One-time profile completion.
    ///
    /// Which contact field must be supplied depends on how the account was
    /// created: phone accounts must add an email, email/google accounts
    /// must add a phone. Uniqueness is checked app-side first; the storage
    /// constraint resolves any race.
    pub async fn complete_profile(
        &self,
        user_id: Uuid,
        request: CompleteProfileRequest,
    ) -> Result<User, AppError> {
        let profile = validate_complete_profile(
            &request.first_name,
            &request.last_name,
            request.phone.as_deref(),
            request.email.as_deref(),
            request.is_advisor,
            request.terms_accepted,
        )?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let user = not_deleted(user)?;

        if user.profile_completed {
            return Err(AppError::Conflict(
                "Profile is already completed".to_string(),
            ));
        }

        // The credential the account was created with is already verified
        // and cannot be swapped here; only the missing contact field may
        // be added.
        let provider = user.provider()?;
        match provider {
            AuthProvider::Phone => {
                if let Some(phone) = &profile.phone {
                    if user.phone.as_deref() != Some(phone.as_str()) {
                        return Err(AppError::Validation(
                            "Phone number cannot be changed during profile completion".to_string(),
                        ));
                    }
                }
                let email = profile.email.clone().ok_or_else(|| {
                    AppError::Validation("Email is required to complete your profile".to_string())
                })?;
                self.ensure_email_free(&email, user.id).await?;
            }
            AuthProvider::Email | AuthProvider::Google | AuthProvider::Apple => {
                if let Some(email) = &profile.email {
                    if user.email.is_some() && user.email.as_deref() != Some(email.as_str()) {
                        return Err(AppError::Validation(
                            "Email cannot be changed during profile completion".to_string(),
                        ));
                    }
                    self.ensure_email_free(email, user.id).await?;
                }
                let phone = profile.phone.clone().ok_or_else(|| {
                    AppError::Validation(
                        "Phone number is required to complete your profile".to_string(),
                    )
                })?;
                self.ensure_phone_free(&phone, user.id).await?;
            }
        }

        let completed = self
            .users
            .complete_profile(
                user.id,
                ProfileFields {
                    name: format!("{} {}", profile.first_name, profile.last_name),
                    email: profile.email,
                    phone: profile.phone,
                    is_advisor: profile.is_advisor,
                },
            )
            .await?;

        if !completed {
            return Err(AppError::Conflict(
                "Profile is already completed".to_string(),
            ));
        }

        self.users
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn ensure_email_free(&self, email: &str, user_id: Uuid) -> Result<(), AppError> {
        if let Some(other) = self.users.find_by_email(email).await? {
            if other.id != user_id {
                return Err(AppError::Conflict(
                    "This email is already registered".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn ensure_phone_free(&self, phone: &str, user_id: Uuid) -> Result<(), AppError> {
        if let Some(other) = self.users.find_by_phone(phone).await? {
            if other.id != user_id {
                return Err(AppError::Conflict(
                    "This phone number is already registered".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Start a password reset. The response is identical whether or not the
    /// email is registered, so the endpoint cannot be used to enumerate
    /// accounts; an unknown email gets a decoy otp id.
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<OtpChallenge, AppError> {
        let email = validate_email(email)?;

        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(OtpChallenge {
                otp_id: Uuid::new_v4(),
                message: RESET_SENT_MESSAGE.to_string(),
            });
        };
        let user = not_deleted(user)?;

        if user.provider != AuthProvider::Email.as_str() {
            return Err(AppError::Validation(
                "This account uses social sign-in; reset your password with that provider"
                    .to_string(),
            ));
        }

        let otp_id = self
            .otp_service
            .resend(DeliveryChannel::Email(email), OtpPurpose::Reset)
            .await?;

        Ok(OtpChallenge {
            otp_id,
            message: RESET_SENT_MESSAGE.to_string(),
        })
    }

    /// Exchange a verified reset OTP for a short-lived reset token, the
    /// hand-off artifact between "code verified" and "password changed".
    pub async fn verify_password_reset_otp(
        &self,
        request: VerifyResetOtpRequest,
    ) -> Result<ResetTokenResponse, AppError> {
        let email = validate_email(&request.email)?;

        let ConsumedOtp { user, .. } = self
            .otp_service
            .consume(
                request.otp_id,
                &request.code,
                Some(OtpPurpose::Reset),
                Some(&email),
                None,
            )
            .await?;

        if user.provider != AuthProvider::Email.as_str() {
            return Err(AppError::Unauthorized("Invalid OTP".to_string()));
        }

        let reset_token = self
            .jwt
            .create_reset_token(user.id, &email, self.reset_token_ttl_minutes)
            .map_err(AppError::Internal)?;

        Ok(ResetTokenResponse { reset_token })
    }

    /// Apply a new password. Single use is enforced by the watermark: a
    /// token minted before the last successful reset is dead.
    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
    ) -> Result<MessageResponse, AppError> {
        let invalid =
            || AppError::Unauthorized("Invalid or expired reset token".to_string());

        let claims = self
            .jwt
            .verify_reset_token(&request.reset_token)
            .map_err(|_| invalid())?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| invalid())?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .filter(|u| !u.is_deleted)
            .ok_or_else(invalid)?;

        if user.provider != AuthProvider::Email.as_str()
            || user.email.as_deref() != Some(claims.email.as_str())
        {
            return Err(invalid());
        }

        // Inclusive comparison: `iat` has second resolution, so a reset
        // kills every token minted in or before its own second.
        if let Some(last_reset) = user.last_password_reset_at {
            if last_reset.timestamp() >= claims.iat {
                return Err(invalid());
            }
        }

        validate_password(&request.new_password)?;
        let password_hash = self
            .hasher
            .hash(&request.new_password)
            .map_err(AppError::Internal)?;

        self.users
            .update(
                user.id,
                UserPatch {
                    password_hash: Some(password_hash),
                    last_password_reset_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        Ok(MessageResponse {
            message: "Password has been reset".to_string(),
        })
    }
}

fn not_deleted(user: User) -> Result<User, AppError> {
    if user.is_deleted {
        return Err(AppError::Unauthorized("Account is disabled".to_string()));
    }
    Ok(user)
}
