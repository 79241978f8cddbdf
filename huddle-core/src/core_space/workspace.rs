//! Workspace aggregate

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ordered_set::OrderedSet;
use super::roster::{Roster, RosterError};
use super::types::{ChannelId, Timestamp, UserId, WorkspaceId};

/// A Workspace groups members and channels (like a Slack team)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique identifier
    pub id: WorkspaceId,

    /// Human-readable name, unique across all workspaces
    pub name: String,

    /// Logo reference
    pub logo: String,

    /// User who created the workspace
    pub created_by: UserId,

    /// Channels in creation order
    pub channels: OrderedSet<ChannelId>,

    /// Members and admins
    #[serde(flatten)]
    pub roster: Roster,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Workspace {
    /// Create a new Workspace with the creator as sole member and admin
    pub fn new(name: String, logo: String, creator: UserId) -> Self {
        let now = Timestamp::now();
        Workspace {
            id: WorkspaceId::generate(),
            name,
            logo,
            created_by: creator,
            channels: OrderedSet::new(),
            roster: Roster::with_founder(creator),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply metadata changes. Fields left as `None` keep their value.
    pub fn update(&mut self, name: Option<String>, logo: Option<String>) {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(logo) = logo {
            self.logo = logo;
        }
        self.updated_at = Timestamp::now();
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.roster.is_member(user)
    }

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.roster.is_admin(user)
    }

    pub fn add_member(&mut self, user: UserId) -> Result<(), WorkspaceError> {
        self.roster.add_member(user)?;
        self.touch();
        Ok(())
    }

    /// Remove a member. Returns the backfilled admin if one was promoted.
    pub fn remove_member(&mut self, user: &UserId) -> Result<Option<UserId>, WorkspaceError> {
        let promoted = self.roster.remove_member(user)?;
        self.touch();
        Ok(promoted)
    }

    pub fn promote(&mut self, user: UserId) -> Result<(), WorkspaceError> {
        self.roster.promote(user)?;
        self.touch();
        Ok(())
    }

    pub fn demote(&mut self, user: &UserId) -> Result<Option<UserId>, WorkspaceError> {
        let promoted = self.roster.demote(user)?;
        self.touch();
        Ok(promoted)
    }

    pub fn add_channel(&mut self, channel_id: ChannelId) {
        if self.channels.insert(channel_id) {
            self.touch();
        }
    }

    pub fn remove_channel(&mut self, channel_id: &ChannelId) -> Result<(), WorkspaceError> {
        if !self.channels.remove(channel_id) {
            return Err(WorkspaceError::ChannelNotFound);
        }
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

/// Workspace-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error("Channel is not part of this workspace")]
    ChannelNotFound,
}
