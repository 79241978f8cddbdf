use axum::{
    extract::{Path, State},
    Json,
};

use huddle_core::core_identity::IdentityManager;
use huddle_core::core_space::{
    ChannelId, ChannelManager, InviteScope, MembershipManager, MessageId, NewMessage, Removal,
    UserId, WorkspaceId,
};

use super::blocking;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{
    ChannelResponse, CreateChannelRequest, EditMessageRequest, InviteMailRequest, LinkResponse,
    MessagesBody, PostMessageRequest, UpdateRequest,
};

/// POST /api/channels
pub async fn create(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(req): Json<CreateChannelRequest>,
) -> ApiResult<Json<ChannelResponse>> {
    let workspace: WorkspaceId = req
        .workspace
        .parse()
        .map_err(|_| ApiError::BadRequest("Workspace is required".into()))?;

    let channel = blocking(move || {
        Ok(state.spaces.create_channel(&actor, &workspace, &req.name, &req.logo)?)
    })
    .await?;
    Ok(Json(ChannelResponse { channel }))
}

/// GET /api/channels/:id
pub async fn get_one(
    State(state): State<AppState>,
    AuthUser(_actor): AuthUser,
    Path(id): Path<ChannelId>,
) -> ApiResult<Json<ChannelResponse>> {
    let channel = blocking(move || Ok(state.spaces.get_channel(&id)?)).await?;
    Ok(Json(ChannelResponse { channel }))
}

/// PUT /api/channels/:id
pub async fn update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<ChannelId>,
    Json(req): Json<UpdateRequest>,
) -> ApiResult<Json<ChannelResponse>> {
    let channel = blocking(move || {
        Ok(state
            .spaces
            .update_channel(&actor, &id, req.name.as_deref(), req.logo.as_deref())?)
    })
    .await?;
    Ok(Json(ChannelResponse { channel }))
}

/// DELETE /api/channels/:id
pub async fn remove(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<ChannelId>,
) -> ApiResult<Json<MessagesBody>> {
    blocking(move || Ok(state.spaces.delete_channel(&actor, &id)?)).await?;
    Ok(Json(MessagesBody::single("Channel deleted successfully")))
}

/// DELETE /api/channels/:id/:user
pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((id, user)): Path<(ChannelId, UserId)>,
) -> ApiResult<Json<MessagesBody>> {
    let removal =
        blocking(move || Ok(state.spaces.remove_channel_member(&actor, &id, &user)?)).await?;

    let msg = match (removal, actor == user) {
        (Removal::Deleted, _) => "Channel deleted as its last member left",
        (Removal::Updated(_), true) => "Left channel successfully",
        (Removal::Updated(_), false) => "Removed user successfully",
    };
    Ok(Json(MessagesBody::single(msg)))
}

/// POST /api/channels/add/:channel_id/:user_id
pub async fn add_member(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((id, user)): Path<(ChannelId, UserId)>,
) -> ApiResult<Json<ChannelResponse>> {
    let channel = blocking(move || Ok(state.spaces.add_channel_member(&actor, &id, &user)?)).await?;
    Ok(Json(ChannelResponse { channel }))
}

/// GET /api/channels/invite/:id
pub async fn issue_invite(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<ChannelId>,
) -> ApiResult<Json<LinkResponse>> {
    let link = blocking(move || {
        let scope = InviteScope::Channel(id);
        let token = state.spaces.issue_invite(&actor, scope)?;
        Ok(state.invitations.link(&scope, &token))
    })
    .await?;
    Ok(Json(LinkResponse { link }))
}

/// POST /api/channels/invite/:token
pub async fn join(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(token): Path<String>,
) -> ApiResult<Json<ChannelResponse>> {
    let channel = blocking(move || Ok(state.spaces.join_channel(&actor, &token)?)).await?;
    Ok(Json(ChannelResponse { channel }))
}

/// POST /api/channels/invite/:id/mail
pub async fn mail_invitations(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<ChannelId>,
    Json(req): Json<InviteMailRequest>,
) -> ApiResult<Json<LinkResponse>> {
    let link = blocking(move || {
        let inviter = state.identity.current_user(&actor)?;
        Ok(state.invitations.send_invitations(
            state.spaces.as_ref(),
            &inviter,
            InviteScope::Channel(id),
            &req.emails,
        )?)
    })
    .await?;
    Ok(Json(LinkResponse { link }))
}

/// POST /api/channels/admin/:channel_id/:user_id
pub async fn promote(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((id, user)): Path<(ChannelId, UserId)>,
) -> ApiResult<Json<ChannelResponse>> {
    let channel =
        blocking(move || Ok(state.spaces.promote_channel_admin(&actor, &id, &user)?)).await?;
    Ok(Json(ChannelResponse { channel }))
}

/// DELETE /api/channels/admin/:channel_id/:user_id
pub async fn demote(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((id, user)): Path<(ChannelId, UserId)>,
) -> ApiResult<Json<ChannelResponse>> {
    let channel =
        blocking(move || Ok(state.spaces.demote_channel_admin(&actor, &id, &user)?)).await?;
    Ok(Json(ChannelResponse { channel }))
}

/// POST /api/channels/message/:channel_id
pub async fn post_message(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<ChannelId>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<Json<ChannelResponse>> {
    let message = NewMessage {
        body: req.message,
        kind: req.kind,
        display_name: req.name,
        avatar: req.avatar,
    };
    let channel = blocking(move || Ok(state.spaces.post_message(&actor, &id, message)?)).await?;
    Ok(Json(ChannelResponse { channel }))
}

/// PUT /api/channels/message/:channel_id/:message_id
pub async fn edit_message(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((id, message_id)): Path<(ChannelId, MessageId)>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<Json<ChannelResponse>> {
    let channel = blocking(move || {
        Ok(state.spaces.edit_message(&actor, &id, &message_id, &req.message)?)
    })
    .await?;
    Ok(Json(ChannelResponse { channel }))
}
