use axum::{
    extract::{Path, State},
    Json,
};

use huddle_core::core_identity::{IdentityManager, ProfileUpdate};

use super::blocking;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{LinkResponse, PasswordRequest, RegisterRequest, TokenResponse};

/// POST /api/users
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let token =
        blocking(move || Ok(state.identity.register(&req.name, &req.email, &req.password)?)).await?;
    Ok(Json(TokenResponse { token }))
}

/// PUT /api/users
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<TokenResponse>> {
    let token = blocking(move || Ok(state.identity.update_profile(&user, update)?)).await?;
    Ok(Json(TokenResponse { token }))
}

/// POST /api/users/reset-password
pub async fn request_reset(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<LinkResponse>> {
    let link = blocking(move || Ok(state.identity.request_password_reset(&user)?)).await?;
    Ok(Json(LinkResponse { link }))
}

/// POST /api/users/reset-password/:token
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<PasswordRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let token =
        blocking(move || Ok(state.identity.reset_password(&token, &req.password)?)).await?;
    Ok(Json(TokenResponse { token }))
}
