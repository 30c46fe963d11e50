//! Boundary validation for request payloads.
//!
//! Each input shape gets an explicit validation function that normalizes and
//! checks the payload before any orchestrator method runs. Handlers call
//! these first; a failure is a client error with no side effects.

use lazy_static::lazy_static;
use regex::Regex;

use crate::common::AppError;
use crate::domains::users::AuthProvider;

lazy_static! {
    /// E.164-ish: optional +, no leading zero, 8-15 digits total.
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[1-9]\d{7,14}$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Lowercase and trim an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Strip everything except digits and a leading plus.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

pub fn validate_email(email: &str) -> Result<String, AppError> {
    let normalized = normalize_email(email);
    if !EMAIL_RE.is_match(&normalized) {
        return Err(AppError::Validation("Email is not valid".to_string()));
    }
    Ok(normalized)
}

pub fn validate_phone(phone: &str) -> Result<String, AppError> {
    let normalized = normalize_phone(phone);
    if !PHONE_RE.is_match(&normalized) {
        return Err(AppError::Validation(
            "Phone must be in E.164 format or digits only".to_string(),
        ));
    }
    Ok(normalized)
}

/// Minimum-strength check for new passwords.
pub fn validate_password(password: &str) -> Result<String, AppError> {
    if password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(password.to_string())
}

/// A login request validated per its declared type.
#[derive(Debug, Clone)]
pub enum ValidatedLogin {
    Phone { phone: String },
    Email { email: String, password: Option<String> },
}

/// Dispatch-validate a login payload.
///
/// Phone logins require a phone, email logins require an email; password is
/// optional for email (create-without-password flow). Any other provider is
/// rejected here, before the orchestrator runs.
pub fn validate_login(
    provider: AuthProvider,
    phone: Option<&str>,
    email: Option<&str>,
    password: Option<&str>,
) -> Result<ValidatedLogin, AppError> {
    match provider {
        AuthProvider::Phone => {
            let phone = phone
                .ok_or_else(|| AppError::Validation("Phone is required".to_string()))?;
            Ok(ValidatedLogin::Phone {
                phone: validate_phone(phone)?,
            })
        }
        AuthProvider::Email => {
            let email = email
                .ok_or_else(|| AppError::Validation("Email is required".to_string()))?;
            let password = password.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
            Ok(ValidatedLogin::Email {
                email: validate_email(email)?,
                password,
            })
        }
        other => Err(AppError::Validation(format!(
            "Unsupported login provider: {}",
            other.as_str()
        ))),
    }
}

/// Validated profile-completion payload.
#[derive(Debug, Clone)]
pub struct ValidatedProfile {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_advisor: bool,
}

pub fn validate_complete_profile(
    first_name: &str,
    last_name: &str,
    phone: Option<&str>,
    email: Option<&str>,
    is_advisor: bool,
    terms_accepted: bool,
) -> Result<ValidatedProfile, AppError> {
    if !terms_accepted {
        return Err(AppError::Validation(
            "Terms of Service must be accepted".to_string(),
        ));
    }

    let first_name = first_name.trim();
    let last_name = last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::Validation(
            "First name and last name are required".to_string(),
        ));
    }

    Ok(ValidatedProfile {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        phone: phone.map(validate_phone).transpose()?,
        email: email.map(validate_email).transpose()?,
        is_advisor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone_strips_formatting() {
        assert_eq!(normalize_phone("+1 (415) 555-1234"), "+14155551234");
        assert_eq!(normalize_phone("91 99999 99999"), "919999999999");
    }

    #[test]
    fn test_validate_phone_rejects_short_numbers() {
        assert!(validate_phone("+123").is_err());
        assert!(validate_phone("0123456789").is_err()); // leading zero
        assert!(validate_phone("+14155551234").is_ok());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a b@example.com").is_err());
    }

    #[test]
    fn test_validate_login_phone_requires_phone() {
        let result = validate_login(AuthProvider::Phone, None, None, None);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_login_rejects_social_providers() {
        let result = validate_login(AuthProvider::Google, None, Some("a@b.com"), None);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_login_email_password_optional() {
        let result =
            validate_login(AuthProvider::Email, None, Some("Bob@Example.com"), Some("  "));
        match result.unwrap() {
            ValidatedLogin::Email { email, password } => {
                assert_eq!(email, "bob@example.com");
                assert!(password.is_none());
            }
            _ => panic!("expected email login"),
        }
    }

    #[test]
    fn test_validate_password_length() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }

    #[test]
    fn test_complete_profile_requires_terms() {
        let result =
            validate_complete_profile("John", "Doe", None, None, false, false);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
