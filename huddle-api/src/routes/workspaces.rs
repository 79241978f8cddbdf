use axum::{
    extract::{Path, State},
    Json,
};

use huddle_core::core_identity::IdentityManager;
use huddle_core::core_space::{
    InviteScope, MembershipManager, Removal, UserId, WorkspaceId, WorkspaceManager,
};

use super::blocking;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{
    CreateWorkspaceRequest, InviteMailRequest, LinkResponse, MessagesBody, UpdateRequest,
    WorkspaceResponse, WorkspacesResponse,
};

/// POST /api/workspaces
pub async fn create(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let workspace =
        blocking(move || Ok(state.spaces.create_workspace(&actor, &req.name, &req.logo)?)).await?;
    Ok(Json(WorkspaceResponse { workspace }))
}

/// GET /api/workspaces
pub async fn list(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<Json<WorkspacesResponse>> {
    let workspaces = blocking(move || Ok(state.spaces.list_user_workspaces(&actor)?)).await?;
    Ok(Json(WorkspacesResponse { workspaces }))
}

/// GET /api/workspaces/:id
pub async fn get_one(
    State(state): State<AppState>,
    AuthUser(_actor): AuthUser,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let workspace = blocking(move || Ok(state.spaces.get_workspace(&id)?)).await?;
    Ok(Json(WorkspaceResponse { workspace }))
}

/// PUT /api/workspaces/:id
pub async fn update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<WorkspaceId>,
    Json(req): Json<UpdateRequest>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let workspace = blocking(move || {
        Ok(state
            .spaces
            .update_workspace(&actor, &id, req.name.as_deref(), req.logo.as_deref())?)
    })
    .await?;
    Ok(Json(WorkspaceResponse { workspace }))
}

/// DELETE /api/workspaces/:id
pub async fn remove(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<Json<MessagesBody>> {
    blocking(move || Ok(state.spaces.delete_workspace(&actor, &id)?)).await?;
    Ok(Json(MessagesBody::single("Workspace deleted successfully")))
}

/// DELETE /api/workspaces/:id/:user
pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((id, user)): Path<(WorkspaceId, UserId)>,
) -> ApiResult<Json<MessagesBody>> {
    let removal =
        blocking(move || Ok(state.spaces.remove_workspace_member(&actor, &id, &user)?)).await?;

    let msg = match (removal, actor == user) {
        (Removal::Deleted, _) => "Workspace deleted as its last member left",
        (Removal::Updated(_), true) => "Left workspace successfully",
        (Removal::Updated(_), false) => "Removed user successfully",
    };
    Ok(Json(MessagesBody::single(msg)))
}

/// GET /api/workspaces/invite/:id
pub async fn issue_invite(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<Json<LinkResponse>> {
    let link = blocking(move || {
        let scope = InviteScope::Workspace(id);
        let token = state.spaces.issue_invite(&actor, scope)?;
        Ok(state.invitations.link(&scope, &token))
    })
    .await?;
    Ok(Json(LinkResponse { link }))
}

/// POST /api/workspaces/invite/:token
pub async fn join(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(token): Path<String>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let workspace = blocking(move || Ok(state.spaces.join_workspace(&actor, &token)?)).await?;
    Ok(Json(WorkspaceResponse { workspace }))
}

/// POST /api/workspaces/invite/:id/mail
pub async fn mail_invitations(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<WorkspaceId>,
    Json(req): Json<InviteMailRequest>,
) -> ApiResult<Json<LinkResponse>> {
    let link = blocking(move || {
        let inviter = state.identity.current_user(&actor)?;
        Ok(state.invitations.send_invitations(
            state.spaces.as_ref(),
            &inviter,
            InviteScope::Workspace(id),
            &req.emails,
        )?)
    })
    .await?;
    Ok(Json(LinkResponse { link }))
}

/// POST /api/workspaces/admin/:workspace_id/:user_id
pub async fn promote(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((id, user)): Path<(WorkspaceId, UserId)>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let workspace =
        blocking(move || Ok(state.spaces.promote_workspace_admin(&actor, &id, &user)?)).await?;
    Ok(Json(WorkspaceResponse { workspace }))
}

/// DELETE /api/workspaces/admin/:workspace_id/:user_id
pub async fn demote(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((id, user)): Path<(WorkspaceId, UserId)>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let workspace =
        blocking(move || Ok(state.spaces.demote_workspace_admin(&actor, &id, &user)?)).await?;
    Ok(Json(WorkspaceResponse { workspace }))
}
