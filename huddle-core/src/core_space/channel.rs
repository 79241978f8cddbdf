//! Channel aggregate and message history

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::roster::{Roster, RosterError};
use super::types::{ChannelId, MessageId, Timestamp, UserId, WorkspaceId};

/// Message kind used when a client does not send one
pub const DEFAULT_MESSAGE_KIND: &str = "message";

/// A Channel is a conversation inside a Workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,

    /// Workspace this channel belongs to
    pub workspace_id: WorkspaceId,

    pub name: String,
    pub logo: String,
    pub created_by: UserId,

    #[serde(flatten)]
    pub roster: Roster,

    /// Messages, newest first
    pub history: Vec<Message>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub body: String,
    pub kind: String,
    pub author_id: UserId,

    /// Author's display name at posting time
    pub display_name: String,

    /// Author's avatar at posting time
    pub avatar: String,

    pub created_at: Timestamp,
    pub edited_at: Option<Timestamp>,
}

/// Input for posting a message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub body: String,
    pub kind: Option<String>,
    pub display_name: String,
    pub avatar: String,
}

impl Channel {
    /// Create a new Channel with the creator as sole member and admin
    pub fn new(workspace_id: WorkspaceId, name: String, logo: String, creator: UserId) -> Self {
        let now = Timestamp::now();
        Channel {
            id: ChannelId::generate(),
            workspace_id,
            name,
            logo,
            created_by: creator,
            roster: Roster::with_founder(creator),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&mut self, name: Option<String>, logo: Option<String>) {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(logo) = logo {
            self.logo = logo;
        }
        self.touch();
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.roster.is_member(user)
    }

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.roster.is_admin(user)
    }

    pub fn add_member(&mut self, user: UserId) -> Result<(), ChannelError> {
        self.roster.add_member(user)?;
        self.touch();
        Ok(())
    }

    pub fn remove_member(&mut self, user: &UserId) -> Result<Option<UserId>, ChannelError> {
        let promoted = self.roster.remove_member(user)?;
        self.touch();
        Ok(promoted)
    }

    pub fn promote(&mut self, user: UserId) -> Result<(), ChannelError> {
        self.roster.promote(user)?;
        self.touch();
        Ok(())
    }

    pub fn demote(&mut self, user: &UserId) -> Result<Option<UserId>, ChannelError> {
        let promoted = self.roster.demote(user)?;
        self.touch();
        Ok(promoted)
    }

    /// Prepend a message to the history. Only members may post.
    pub fn post_message(&mut self, author: UserId, message: NewMessage) -> Result<&Message, ChannelError> {
        if !self.is_member(&author) {
            return Err(ChannelError::Roster(RosterError::NotMember));
        }

        let kind = message
            .kind
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE_KIND.to_string());

        self.history.insert(
            0,
            Message {
                id: MessageId::generate(),
                body: message.body,
                kind,
                author_id: author,
                display_name: message.display_name,
                avatar: message.avatar,
                created_at: Timestamp::now(),
                edited_at: None,
            },
        );
        self.touch();
        Ok(&self.history[0])
    }

    /// Replace the body of a message. Only its author may edit it.
    pub fn edit_message(
        &mut self,
        author: &UserId,
        message_id: &MessageId,
        body: String,
    ) -> Result<&Message, ChannelError> {
        let message = self
            .history
            .iter_mut()
            .find(|m| &m.id == message_id)
            .ok_or(ChannelError::MessageNotFound)?;

        if &message.author_id != author {
            return Err(ChannelError::NotAuthor);
        }

        message.body = body;
        message.edited_at = Some(Timestamp::now());
        self.updated_at = Timestamp::now();

        self.history
            .iter()
            .find(|m| &m.id == message_id)
            .ok_or(ChannelError::MessageNotFound)
    }

    pub fn message(&self, message_id: &MessageId) -> Option<&Message> {
        self.history.iter().find(|m| &m.id == message_id)
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

/// Channel-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error("Message not found")]
    MessageNotFound,

    #[error("Only the author can edit a message")]
    NotAuthor,
}
