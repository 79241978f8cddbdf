use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use huddle_core::core_identity::IdentityError;
use huddle_core::core_space::MembershipError;

use crate::types::{ErrorBody, Notice};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Membership(e) => match e {
                MembershipError::NotFound(_) => StatusCode::NOT_FOUND,
                MembershipError::Unauthorized(_) => StatusCode::FORBIDDEN,
                MembershipError::AlreadyMember
                | MembershipError::AlreadyAdmin
                | MembershipError::NotMember
                | MembershipError::NotAdmin
                | MembershipError::DuplicateName(_)
                | MembershipError::Invalid(_) => StatusCode::BAD_REQUEST,
                MembershipError::InvalidOrExpired => StatusCode::UNAUTHORIZED,
                MembershipError::Conflict => StatusCode::CONFLICT,
                MembershipError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Identity(e) => match e {
                IdentityError::Invalid(_)
                | IdentityError::EmailTaken
                | IdentityError::InvalidCredentials => StatusCode::BAD_REQUEST,
                IdentityError::InvalidToken => StatusCode::UNAUTHORIZED,
                IdentityError::NotFound => StatusCode::NOT_FOUND,
                IdentityError::Conflict => StatusCode::CONFLICT,
                IdentityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody { errors: vec![Notice { msg }] };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
