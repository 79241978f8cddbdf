//! Identity management
//!
//! Accounts, password hashing, request validation and signed tokens.
//! [`IdentityService`] ties them together for registration, login,
//! profile updates and password resets.

pub mod manager;
pub mod password;
pub mod token;
pub mod user;
pub mod validation;

pub use manager::{IdentityManager, IdentityService, ProfileUpdate};
pub use password::PasswordHashing;
pub use token::{TokenError, TokenSigner};
pub use user::User;
pub use validation::ValidationError;

use thiserror::Error;

use crate::core_space::storage::StoreError;

pub type IdentityResult<T> = Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("User already exists")]
    EmailTaken,

    /// Unknown email and wrong password are deliberately the same error
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token is invalid or expired")]
    InvalidToken,

    #[error("User not found")]
    NotFound,

    #[error("Concurrent update, please retry")]
    Conflict,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityError::Invalid(_) => "invalid",
            IdentityError::EmailTaken => "email_taken",
            IdentityError::InvalidCredentials => "invalid_credentials",
            IdentityError::InvalidToken => "invalid_token",
            IdentityError::NotFound => "not_found",
            IdentityError::Conflict => "conflict",
            IdentityError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Busy => IdentityError::Conflict,
            other => IdentityError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for IdentityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => IdentityError::InvalidToken,
            TokenError::Signing(detail) => IdentityError::Internal(detail),
        }
    }
}

impl From<ValidationError> for IdentityError {
    fn from(err: ValidationError) -> Self {
        IdentityError::Invalid(err.to_string())
    }
}
