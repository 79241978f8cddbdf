//! Validation module
//!
//! Stateless validators for user-supplied names, emails and passwords.

use thiserror::Error;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Please include a valid email")]
    BadEmail,

    #[error("Password must be between {min} and {max} characters")]
    PasswordLength { min: usize, max: usize },
}

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 20;
pub const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;

/// Validate a display, workspace or channel name and return it trimmed
pub fn validate_name(field: &'static str, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong { field, max: MAX_NAME_LEN });
    }
    Ok(trimmed.to_string())
}

/// Validate an email address and return it normalized to lowercase
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::Missing("email"));
    }
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::BadEmail);
    }

    let (local, domain) = email.split_once('@').ok_or(ValidationError::BadEmail)?;
    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    if local.is_empty() || !domain_ok {
        return Err(ValidationError::BadEmail);
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(ValidationError::PasswordLength { min: MIN_PASSWORD_LEN, max: MAX_PASSWORD_LEN });
    }
    Ok(())
}

/// Non-empty free-form field such as a logo or message body
pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing(field));
    }
    Ok(())
}
