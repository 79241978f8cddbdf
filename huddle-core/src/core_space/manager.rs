//! Manager traits for workspace, channel and membership operations
//!
//! Every operation runs in one store transaction: it either applies all
//! of its changes (both sides of every membership link included) or none.

use std::fmt;
use thiserror::Error;

use super::channel::{Channel, ChannelError, NewMessage};
use super::invite::{InviteError, InviteScope};
use super::roster::RosterError;
use super::storage::StoreError;
use super::types::{ChannelId, MessageId, UserId, WorkspaceId};
use super::workspace::{Workspace, WorkspaceError};
use crate::core_identity::validation::ValidationError;

pub type MembershipResult<T> = Result<T, MembershipError>;

/// Manager for workspace lifecycle
pub trait WorkspaceManager {
    /// Create a workspace with a default channel. The creator becomes
    /// sole member and admin of both.
    fn create_workspace(&self, actor: &UserId, name: &str, logo: &str) -> MembershipResult<Workspace>;

    fn get_workspace(&self, id: &WorkspaceId) -> MembershipResult<Workspace>;

    /// Workspaces the user belongs to, in join order
    fn list_user_workspaces(&self, user: &UserId) -> MembershipResult<Vec<Workspace>>;

    /// Rename or change the logo (admins only)
    fn update_workspace(
        &self,
        actor: &UserId,
        id: &WorkspaceId,
        name: Option<&str>,
        logo: Option<&str>,
    ) -> MembershipResult<Workspace>;

    /// Delete a workspace with all its channels (admins only)
    fn delete_workspace(&self, actor: &UserId, id: &WorkspaceId) -> MembershipResult<()>;
}

/// Manager for channels and their messages
pub trait ChannelManager {
    /// Create a channel inside a workspace the actor belongs to
    fn create_channel(
        &self,
        actor: &UserId,
        workspace_id: &WorkspaceId,
        name: &str,
        logo: &str,
    ) -> MembershipResult<Channel>;

    fn get_channel(&self, id: &ChannelId) -> MembershipResult<Channel>;

    fn update_channel(
        &self,
        actor: &UserId,
        id: &ChannelId,
        name: Option<&str>,
        logo: Option<&str>,
    ) -> MembershipResult<Channel>;

    fn delete_channel(&self, actor: &UserId, id: &ChannelId) -> MembershipResult<()>;

    /// Post a message (members only). Returns the channel with the new
    /// message at the head of its history.
    fn post_message(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        message: NewMessage,
    ) -> MembershipResult<Channel>;

    /// Edit a message (its author only)
    fn edit_message(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        message_id: &MessageId,
        body: &str,
    ) -> MembershipResult<Channel>;
}

/// Manager for invites, joins, departures and admin roles
pub trait MembershipManager {
    /// Issue an invite token (admins of the target only)
    fn issue_invite(&self, actor: &UserId, scope: InviteScope) -> MembershipResult<String>;

    fn verify_invite(&self, token: &str) -> MembershipResult<InviteScope>;

    /// Join the workspace named by a workspace invite. Also joins its
    /// default channel.
    fn join_workspace(&self, actor: &UserId, token: &str) -> MembershipResult<Workspace>;

    /// Remove `target` from a workspace and from each of its channels.
    /// Members may remove themselves; removing others requires admin. The
    /// workspace is deleted when its last member leaves.
    fn remove_workspace_member(
        &self,
        actor: &UserId,
        workspace_id: &WorkspaceId,
        target: &UserId,
    ) -> MembershipResult<Removal<Workspace>>;

    fn promote_workspace_admin(
        &self,
        actor: &UserId,
        workspace_id: &WorkspaceId,
        target: &UserId,
    ) -> MembershipResult<Workspace>;

    fn demote_workspace_admin(
        &self,
        actor: &UserId,
        workspace_id: &WorkspaceId,
        target: &UserId,
    ) -> MembershipResult<Workspace>;

    /// Join the channel named by a channel invite. The caller must already
    /// belong to the channel's workspace.
    fn join_channel(&self, actor: &UserId, token: &str) -> MembershipResult<Channel>;

    /// Add a workspace member to a channel (channel admins only)
    fn add_channel_member(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        target: &UserId,
    ) -> MembershipResult<Channel>;

    fn remove_channel_member(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        target: &UserId,
    ) -> MembershipResult<Removal<Channel>>;

    fn promote_channel_admin(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        target: &UserId,
    ) -> MembershipResult<Channel>;

    fn demote_channel_admin(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        target: &UserId,
    ) -> MembershipResult<Channel>;
}

/// Outcome of removing a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal<T> {
    /// The aggregate still has members
    Updated(T),
    /// The last member left and the aggregate was deleted
    Deleted,
}

/// Kinds of records an operation can fail to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Workspace,
    Channel,
    Message,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::User => "User",
            Entity::Workspace => "Workspace",
            Entity::Channel => "Channel",
            Entity::Message => "Message",
        };
        f.write_str(name)
    }
}

/// Errors returned by every manager operation
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("{0} not found")]
    NotFound(Entity),

    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("User is already a member")]
    AlreadyMember,

    #[error("User is already an admin")]
    AlreadyAdmin,

    #[error("User is not a member")]
    NotMember,

    #[error("User is not an admin")]
    NotAdmin,

    #[error("Workspace name already exists: {0}")]
    DuplicateName(String),

    #[error("Invite is invalid or expired")]
    InvalidOrExpired,

    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Lost a race against a concurrent writer; the operation was not applied
    #[error("Concurrent update, please retry")]
    Conflict,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MembershipError {
    /// Short stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            MembershipError::NotFound(_) => "not_found",
            MembershipError::Unauthorized(_) => "unauthorized",
            MembershipError::AlreadyMember => "already_member",
            MembershipError::AlreadyAdmin => "already_admin",
            MembershipError::NotMember => "not_member",
            MembershipError::NotAdmin => "not_admin",
            MembershipError::DuplicateName(_) => "duplicate_name",
            MembershipError::InvalidOrExpired => "invalid_invite",
            MembershipError::Invalid(_) => "invalid",
            MembershipError::Conflict => "conflict",
            MembershipError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for MembershipError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Busy => MembershipError::Conflict,
            other => MembershipError::Internal(other.to_string()),
        }
    }
}

impl From<RosterError> for MembershipError {
    fn from(err: RosterError) -> Self {
        match err {
            RosterError::AlreadyMember => MembershipError::AlreadyMember,
            RosterError::NotMember => MembershipError::NotMember,
            RosterError::AlreadyAdmin => MembershipError::AlreadyAdmin,
            RosterError::NotAdmin => MembershipError::NotAdmin,
        }
    }
}

impl From<WorkspaceError> for MembershipError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::Roster(e) => e.into(),
            WorkspaceError::ChannelNotFound => MembershipError::NotFound(Entity::Channel),
        }
    }
}

impl From<ChannelError> for MembershipError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Roster(e) => e.into(),
            ChannelError::MessageNotFound => MembershipError::NotFound(Entity::Message),
            ChannelError::NotAuthor => MembershipError::Unauthorized("only the author can edit a message"),
        }
    }
}

impl From<InviteError> for MembershipError {
    fn from(err: InviteError) -> Self {
        match err {
            InviteError::InvalidOrExpired => MembershipError::InvalidOrExpired,
            InviteError::Signing(detail) => MembershipError::Internal(detail),
        }
    }
}

impl From<ValidationError> for MembershipError {
    fn from(err: ValidationError) -> Self {
        MembershipError::Invalid(err.to_string())
    }
}
