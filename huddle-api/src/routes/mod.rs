//! HTTP routes

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

mod auth;
mod channels;
mod health;
mod users;
mod workspaces;

/// Build the router with every endpoint
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Users
        .route("/api/users", post(users::register).put(users::update_profile))
        .route("/api/users/reset-password", post(users::request_reset))
        .route("/api/users/reset-password/:token", post(users::reset_password))
        // Auth
        .route("/api/auth", post(auth::login).get(auth::current_user))
        // Workspaces
        .route(
            "/api/workspaces",
            post(workspaces::create).get(workspaces::list),
        )
        .route(
            "/api/workspaces/:id",
            get(workspaces::get_one)
                .put(workspaces::update)
                .delete(workspaces::remove),
        )
        .route("/api/workspaces/:id/:user", delete(workspaces::remove_member))
        .route(
            "/api/workspaces/invite/:id",
            get(workspaces::issue_invite).post(workspaces::join),
        )
        .route("/api/workspaces/invite/:id/mail", post(workspaces::mail_invitations))
        .route(
            "/api/workspaces/admin/:workspace_id/:user_id",
            post(workspaces::promote).delete(workspaces::demote),
        )
        // Channels
        .route("/api/channels", post(channels::create))
        .route(
            "/api/channels/:id",
            get(channels::get_one)
                .put(channels::update)
                .delete(channels::remove),
        )
        .route("/api/channels/:id/:user", delete(channels::remove_member))
        .route("/api/channels/add/:channel_id/:user_id", post(channels::add_member))
        .route(
            "/api/channels/invite/:id",
            get(channels::issue_invite).post(channels::join),
        )
        .route("/api/channels/invite/:id/mail", post(channels::mail_invitations))
        .route(
            "/api/channels/admin/:channel_id/:user_id",
            post(channels::promote).delete(channels::demote),
        )
        .route("/api/channels/message/:channel_id", post(channels::post_message))
        .route(
            "/api/channels/message/:channel_id/:message_id",
            put(channels::edit_message),
        )
        // Health
        .route("/health", get(health::health))
        .with_state(state)
}

/// Run store-bound work on the blocking pool
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {}", e)))?
}
