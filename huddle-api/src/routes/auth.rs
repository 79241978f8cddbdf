use axum::{extract::State, Json};

use huddle_core::core_identity::IdentityManager;

use super::blocking;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{LoginRequest, TokenResponse, UserResponse};

/// POST /api/auth
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let token = blocking(move || Ok(state.identity.login(&req.email, &req.password)?)).await?;
    Ok(Json(TokenResponse { token }))
}

/// GET /api/auth
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(id): AuthUser,
) -> ApiResult<Json<UserResponse>> {
    let user = blocking(move || Ok(state.identity.current_user(&id)?)).await?;
    Ok(Json(UserResponse { user }))
}
