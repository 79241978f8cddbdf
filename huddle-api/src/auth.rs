//! Session authentication for request handlers

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use huddle_core::core_identity::IdentityManager;
use huddle_core::core_space::UserId;

use crate::error::ApiError;
use crate::state::AppState;

pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// The caller, resolved from a session token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or(ApiError::Unauthenticated("No token, authorization denied"))?;

        let state = AppState::from_ref(state);
        let user = state.identity.authenticate(token)?;
        Ok(AuthUser(user))
    }
}

/// `Authorization: Bearer <token>` or `x-auth-token: <token>`
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    bearer
        .or_else(|| headers.get(AUTH_TOKEN_HEADER).and_then(|value| value.to_str().ok()))
        .filter(|token| !token.is_empty())
}
