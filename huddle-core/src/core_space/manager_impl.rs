//! Transactional implementation of the manager traits
//!
//! Each operation loads the aggregates it touches, applies the change in
//! memory and writes everything back inside one IMMEDIATE transaction.

use tracing::{debug, info, instrument, warn};

use super::channel::{Channel, NewMessage};
use super::invite::{InviteScope, InviteTokenService};
use super::manager::{
    ChannelManager, Entity, MembershipError, MembershipManager, MembershipResult, Removal,
    WorkspaceManager,
};
use super::storage::{SqlStore, StoreTx};
use super::types::{ChannelId, MessageId, UserId, WorkspaceId};
use super::workspace::Workspace;
use crate::config::WorkspaceConfig;
use crate::core_identity::user::User;
use crate::core_identity::validation::{require, validate_name};
use crate::metrics;

/// Coordinates workspaces, channels and user membership links
pub struct MembershipCoordinator {
    store: SqlStore,
    invites: InviteTokenService,
    defaults: WorkspaceConfig,
}

impl MembershipCoordinator {
    pub fn new(store: SqlStore, invites: InviteTokenService, defaults: WorkspaceConfig) -> Self {
        Self { store, invites, defaults }
    }

    pub fn store(&self) -> &SqlStore {
        &self.store
    }

    fn write<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> MembershipResult<T>) -> MembershipResult<T> {
        self.store.transaction(f)
    }

    fn read<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> MembershipResult<T>) -> MembershipResult<T> {
        self.store.snapshot(f)
    }

    fn load_user(tx: &StoreTx<'_>, id: &UserId) -> MembershipResult<User> {
        tx.get_user(id)?.ok_or(MembershipError::NotFound(Entity::User))
    }

    fn load_workspace(tx: &StoreTx<'_>, id: &WorkspaceId) -> MembershipResult<Workspace> {
        tx.get_workspace(id)?.ok_or(MembershipError::NotFound(Entity::Workspace))
    }

    fn load_channel(tx: &StoreTx<'_>, id: &ChannelId) -> MembershipResult<Channel> {
        tx.get_channel(id)?.ok_or(MembershipError::NotFound(Entity::Channel))
    }

    /// Check if user has admin privileges in a Workspace
    fn check_workspace_admin(workspace: &Workspace, user: &UserId) -> MembershipResult<()> {
        if !workspace.is_admin(user) {
            debug!(workspace_id = %workspace.id, user_id = %user, "workspace admin required");
            return Err(MembershipError::Unauthorized("workspace admin required"));
        }
        Ok(())
    }

    fn check_channel_admin(channel: &Channel, user: &UserId) -> MembershipResult<()> {
        if !channel.is_admin(user) {
            debug!(channel_id = %channel.id, user_id = %user, "channel admin required");
            return Err(MembershipError::Unauthorized("channel admin required"));
        }
        Ok(())
    }

    /// Detach every member, delete every channel, then the workspace
    fn cascade_delete_workspace(tx: &StoreTx<'_>, workspace: &Workspace) -> MembershipResult<()> {
        for member in workspace.roster.members().iter() {
            match tx.get_user(member)? {
                Some(mut user) => {
                    user.workspaces.remove(&workspace.id);
                    tx.save_user(&user)?;
                }
                None => warn!(user_id = %member, "member without user record"),
            }
        }

        for channel_id in tx.channel_ids_for_workspace(&workspace.id)? {
            tx.delete_channel(&channel_id)?;
        }
        tx.delete_workspace(&workspace.id)?;

        info!(workspace_id = %workspace.id, "workspace deleted");
        Ok(())
    }

    /// Remove a channel from its workspace's list, then delete it
    fn detach_and_delete_channel(tx: &StoreTx<'_>, channel: &Channel) -> MembershipResult<()> {
        if let Some(mut workspace) = tx.get_workspace(&channel.workspace_id)? {
            if workspace.remove_channel(&channel.id).is_ok() {
                tx.save_workspace(&workspace)?;
            }
        }
        tx.delete_channel(&channel.id)?;

        info!(channel_id = %channel.id, "channel deleted");
        Ok(())
    }

    /// Take a user out of every channel of a workspace. Channels left
    /// empty are deleted and dropped from the in-memory channel list.
    fn strip_from_channels(
        tx: &StoreTx<'_>,
        workspace: &mut Workspace,
        user: &UserId,
    ) -> MembershipResult<()> {
        for channel_id in workspace.channels.to_vec() {
            let Some(mut channel) = tx.get_channel(&channel_id)? else {
                warn!(channel_id = %channel_id, "workspace lists a missing channel");
                continue;
            };
            if !channel.is_member(user) {
                continue;
            }

            if let Some(promoted) = channel.remove_member(user)? {
                metrics::record_admin_backfill("channel");
                info!(channel_id = %channel_id, promoted = %promoted, "backfilled channel admin");
            }
            if channel.roster.is_empty() {
                workspace.remove_channel(&channel_id)?;
                tx.delete_channel(&channel_id)?;
                info!(channel_id = %channel_id, "channel deleted");
            } else {
                tx.save_channel(&channel)?;
            }
        }
        Ok(())
    }

    fn workspace_from_invite(&self, token: &str) -> MembershipResult<WorkspaceId> {
        match self.invites.verify(token)? {
            InviteScope::Workspace(id) => Ok(id),
            InviteScope::Channel(_) => Err(MembershipError::InvalidOrExpired),
        }
    }

    fn channel_from_invite(&self, token: &str) -> MembershipResult<ChannelId> {
        match self.invites.verify(token)? {
            InviteScope::Channel(id) => Ok(id),
            InviteScope::Workspace(_) => Err(MembershipError::InvalidOrExpired),
        }
    }

    fn validate_optional_name(name: Option<&str>) -> MembershipResult<Option<String>> {
        name.map(|n| validate_name("name", n)).transpose().map_err(Into::into)
    }

    fn validate_optional_logo(logo: Option<&str>) -> MembershipResult<Option<String>> {
        match logo {
            Some(logo) => {
                require("logo", logo)?;
                Ok(Some(logo.to_string()))
            }
            None => Ok(None),
        }
    }
}

impl WorkspaceManager for MembershipCoordinator {
    #[instrument(skip(self))]
    fn create_workspace(&self, actor: &UserId, name: &str, logo: &str) -> MembershipResult<Workspace> {
        let result = (|| -> MembershipResult<_> {
            let name = validate_name("name", name)?;
            require("logo", logo)?;

            self.write(|tx| {
                let mut user = Self::load_user(tx, actor)?;
                if tx.workspace_name_taken(&name, None)? {
                    return Err(MembershipError::DuplicateName(name.clone()));
                }

                let mut workspace = Workspace::new(name.clone(), logo.to_string(), *actor);
                tx.insert_workspace(&workspace)?;

                let general = Channel::new(
                    workspace.id,
                    self.defaults.general_channel.clone(),
                    self.defaults.general_channel_logo.clone(),
                    *actor,
                );
                tx.insert_channel(&general)?;
                workspace.add_channel(general.id);
                tx.save_workspace(&workspace)?;

                user.workspaces.insert(workspace.id);
                tx.save_user(&user)?;

                info!(workspace_id = %workspace.id, "workspace created");
                Ok(workspace)
            })
        })();
        metrics::observe("create_workspace", result)
    }

    fn get_workspace(&self, id: &WorkspaceId) -> MembershipResult<Workspace> {
        self.read(|tx| Self::load_workspace(tx, id))
    }

    fn list_user_workspaces(&self, user: &UserId) -> MembershipResult<Vec<Workspace>> {
        self.read(|tx| {
            let user = Self::load_user(tx, user)?;
            let mut workspaces = Vec::with_capacity(user.workspaces.len());
            for id in user.workspaces.iter() {
                match tx.get_workspace(id)? {
                    Some(ws) => workspaces.push(ws),
                    None => warn!(workspace_id = %id, "user lists a missing workspace"),
                }
            }
            Ok(workspaces)
        })
    }

    #[instrument(skip(self))]
    fn update_workspace(
        &self,
        actor: &UserId,
        id: &WorkspaceId,
        name: Option<&str>,
        logo: Option<&str>,
    ) -> MembershipResult<Workspace> {
        let result = (|| -> MembershipResult<_> {
            let name = Self::validate_optional_name(name)?;
            let logo = Self::validate_optional_logo(logo)?;

            self.write(|tx| {
                let mut workspace = Self::load_workspace(tx, id)?;
                Self::check_workspace_admin(&workspace, actor)?;

                if let Some(name) = &name {
                    if tx.workspace_name_taken(name, Some(id))? {
                        return Err(MembershipError::DuplicateName(name.clone()));
                    }
                }

                workspace.update(name, logo);
                tx.save_workspace(&workspace)?;
                Ok(workspace)
            })
        })();
        metrics::observe("update_workspace", result)
    }

    #[instrument(skip(self))]
    fn delete_workspace(&self, actor: &UserId, id: &WorkspaceId) -> MembershipResult<()> {
        let result = self.write(|tx| {
            let workspace = Self::load_workspace(tx, id)?;
            Self::check_workspace_admin(&workspace, actor)?;
            Self::cascade_delete_workspace(tx, &workspace)
        });
        metrics::observe("delete_workspace", result)
    }
}

impl MembershipManager for MembershipCoordinator {
    #[instrument(skip(self))]
    fn issue_invite(&self, actor: &UserId, scope: InviteScope) -> MembershipResult<String> {
        let result = self.read(|tx| {
            match scope {
                InviteScope::Workspace(id) => {
                    let workspace = Self::load_workspace(tx, &id)?;
                    Self::check_workspace_admin(&workspace, actor)?;
                }
                InviteScope::Channel(id) => {
                    let channel = Self::load_channel(tx, &id)?;
                    Self::check_channel_admin(&channel, actor)?;
                }
            }
            Ok(self.invites.issue(scope, self.invites.default_ttl())?)
        });
        if result.is_ok() {
            metrics::record_invite_issued(scope.kind());
        }
        metrics::observe("issue_invite", result)
    }

    fn verify_invite(&self, token: &str) -> MembershipResult<InviteScope> {
        Ok(self.invites.verify(token)?)
    }

    #[instrument(skip(self, token))]
    fn join_workspace(&self, actor: &UserId, token: &str) -> MembershipResult<Workspace> {
        let result = self.workspace_from_invite(token).and_then(|workspace_id| {
            self.write(|tx| {
                let mut user = Self::load_user(tx, actor)?;
                let mut workspace = Self::load_workspace(tx, &workspace_id)?;

                if workspace.is_member(actor) || user.workspaces.contains(&workspace_id) {
                    return Err(MembershipError::AlreadyMember);
                }

                workspace.add_member(*actor)?;
                user.workspaces.insert(workspace_id);

                for channel_id in workspace.channels.iter() {
                    let Some(mut channel) = tx.get_channel(channel_id)? else {
                        warn!(channel_id = %channel_id, "workspace lists a missing channel");
                        continue;
                    };
                    if channel.name == self.defaults.general_channel && !channel.is_member(actor) {
                        channel.add_member(*actor)?;
                        tx.save_channel(&channel)?;
                    }
                }

                tx.save_workspace(&workspace)?;
                tx.save_user(&user)?;

                info!(workspace_id = %workspace_id, "joined workspace");
                Ok(workspace)
            })
        });
        metrics::observe("join_workspace", result)
    }

    #[instrument(skip(self))]
    fn remove_workspace_member(
        &self,
        actor: &UserId,
        workspace_id: &WorkspaceId,
        target: &UserId,
    ) -> MembershipResult<Removal<Workspace>> {
        let result = self.write(|tx| {
            let mut workspace = Self::load_workspace(tx, workspace_id)?;
            if actor != target {
                Self::check_workspace_admin(&workspace, actor)?;
            }
            if !workspace.is_member(target) {
                return Err(MembershipError::NotMember);
            }

            let mut user = Self::load_user(tx, target)?;
            Self::strip_from_channels(tx, &mut workspace, target)?;
            if let Some(promoted) = workspace.remove_member(target)? {
                metrics::record_admin_backfill("workspace");
                info!(workspace_id = %workspace_id, promoted = %promoted, "backfilled workspace admin");
            }
            user.workspaces.remove(workspace_id);
            tx.save_user(&user)?;

            if workspace.roster.is_empty() {
                Self::cascade_delete_workspace(tx, &workspace)?;
                return Ok(Removal::Deleted);
            }

            tx.save_workspace(&workspace)?;
            Ok(Removal::Updated(workspace))
        });
        metrics::observe("remove_workspace_member", result)
    }

    #[instrument(skip(self))]
    fn promote_workspace_admin(
        &self,
        actor: &UserId,
        workspace_id: &WorkspaceId,
        target: &UserId,
    ) -> MembershipResult<Workspace> {
        let result = self.write(|tx| {
            let mut workspace = Self::load_workspace(tx, workspace_id)?;
            Self::check_workspace_admin(&workspace, actor)?;
            workspace.promote(*target)?;
            tx.save_workspace(&workspace)?;
            Ok(workspace)
        });
        metrics::observe("promote_workspace_admin", result)
    }

    #[instrument(skip(self))]
    fn demote_workspace_admin(
        &self,
        actor: &UserId,
        workspace_id: &WorkspaceId,
        target: &UserId,
    ) -> MembershipResult<Workspace> {
        let result = self.write(|tx| {
            let mut workspace = Self::load_workspace(tx, workspace_id)?;
            Self::check_workspace_admin(&workspace, actor)?;
            if let Some(promoted) = workspace.demote(target)? {
                metrics::record_admin_backfill("workspace");
                info!(workspace_id = %workspace_id, promoted = %promoted, "backfilled workspace admin");
            }
            tx.save_workspace(&workspace)?;
            Ok(workspace)
        });
        metrics::observe("demote_workspace_admin", result)
    }

    #[instrument(skip(self, token))]
    fn join_channel(&self, actor: &UserId, token: &str) -> MembershipResult<Channel> {
        let result = self.channel_from_invite(token).and_then(|channel_id| {
            self.write(|tx| {
                Self::load_user(tx, actor)?;
                let mut channel = Self::load_channel(tx, &channel_id)?;
                let workspace = Self::load_workspace(tx, &channel.workspace_id)?;
                if !workspace.is_member(actor) {
                    debug!(
                        channel_id = %channel_id,
                        user_id = %actor,
                        "channel invite needs workspace membership"
                    );
                    return Err(MembershipError::Unauthorized("workspace membership required"));
                }
                channel.add_member(*actor)?;
                tx.save_channel(&channel)?;

                info!(channel_id = %channel_id, "joined channel");
                Ok(channel)
            })
        });
        metrics::observe("join_channel", result)
    }

    #[instrument(skip(self))]
    fn add_channel_member(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        target: &UserId,
    ) -> MembershipResult<Channel> {
        let result = self.write(|tx| {
            let mut channel = Self::load_channel(tx, channel_id)?;
            Self::check_channel_admin(&channel, actor)?;

            let workspace = Self::load_workspace(tx, &channel.workspace_id)?;
            if !workspace.is_member(target) {
                return Err(MembershipError::NotMember);
            }

            channel.add_member(*target)?;
            tx.save_channel(&channel)?;
            Ok(channel)
        });
        metrics::observe("add_channel_member", result)
    }

    #[instrument(skip(self))]
    fn remove_channel_member(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        target: &UserId,
    ) -> MembershipResult<Removal<Channel>> {
        let result = self.write(|tx| {
            let mut channel = Self::load_channel(tx, channel_id)?;
            if actor != target {
                Self::check_channel_admin(&channel, actor)?;
            }

            if let Some(promoted) = channel.remove_member(target)? {
                metrics::record_admin_backfill("channel");
                info!(channel_id = %channel_id, promoted = %promoted, "backfilled channel admin");
            }

            if channel.roster.is_empty() {
                Self::detach_and_delete_channel(tx, &channel)?;
                return Ok(Removal::Deleted);
            }

            tx.save_channel(&channel)?;
            Ok(Removal::Updated(channel))
        });
        metrics::observe("remove_channel_member", result)
    }

    #[instrument(skip(self))]
    fn promote_channel_admin(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        target: &UserId,
    ) -> MembershipResult<Channel> {
        let result = self.write(|tx| {
            let mut channel = Self::load_channel(tx, channel_id)?;
            Self::check_channel_admin(&channel, actor)?;
            channel.promote(*target)?;
            tx.save_channel(&channel)?;
            Ok(channel)
        });
        metrics::observe("promote_channel_admin", result)
    }

    #[instrument(skip(self))]
    fn demote_channel_admin(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        target: &UserId,
    ) -> MembershipResult<Channel> {
        let result = self.write(|tx| {
            let mut channel = Self::load_channel(tx, channel_id)?;
            Self::check_channel_admin(&channel, actor)?;
            if let Some(promoted) = channel.demote(target)? {
                metrics::record_admin_backfill("channel");
                info!(channel_id = %channel_id, promoted = %promoted, "backfilled channel admin");
            }
            tx.save_channel(&channel)?;
            Ok(channel)
        });
        metrics::observe("demote_channel_admin", result)
    }
}

impl ChannelManager for MembershipCoordinator {
    #[instrument(skip(self))]
    fn create_channel(
        &self,
        actor: &UserId,
        workspace_id: &WorkspaceId,
        name: &str,
        logo: &str,
    ) -> MembershipResult<Channel> {
        let result = (|| -> MembershipResult<_> {
            let name = validate_name("name", name)?;
            require("logo", logo)?;

            self.write(|tx| {
                let mut workspace = Self::load_workspace(tx, workspace_id)?;
                if !workspace.is_member(actor) {
                    return Err(MembershipError::Unauthorized("workspace membership required"));
                }

                let channel = Channel::new(*workspace_id, name.clone(), logo.to_string(), *actor);
                tx.insert_channel(&channel)?;
                workspace.add_channel(channel.id);
                tx.save_workspace(&workspace)?;

                info!(channel_id = %channel.id, "channel created");
                Ok(channel)
            })
        })();
        metrics::observe("create_channel", result)
    }

    fn get_channel(&self, id: &ChannelId) -> MembershipResult<Channel> {
        self.read(|tx| Self::load_channel(tx, id))
    }

    #[instrument(skip(self))]
    fn update_channel(
        &self,
        actor: &UserId,
        id: &ChannelId,
        name: Option<&str>,
        logo: Option<&str>,
    ) -> MembershipResult<Channel> {
        let result = (|| -> MembershipResult<_> {
            let name = Self::validate_optional_name(name)?;
            let logo = Self::validate_optional_logo(logo)?;

            self.write(|tx| {
                let mut channel = Self::load_channel(tx, id)?;
                Self::check_channel_admin(&channel, actor)?;
                channel.update(name, logo);
                tx.save_channel(&channel)?;
                Ok(channel)
            })
        })();
        metrics::observe("update_channel", result)
    }

    #[instrument(skip(self))]
    fn delete_channel(&self, actor: &UserId, id: &ChannelId) -> MembershipResult<()> {
        let result = self.write(|tx| {
            let channel = Self::load_channel(tx, id)?;
            Self::check_channel_admin(&channel, actor)?;
            Self::detach_and_delete_channel(tx, &channel)
        });
        metrics::observe("delete_channel", result)
    }

    #[instrument(skip(self, message), fields(kind = ?message.kind))]
    fn post_message(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        mut message: NewMessage,
    ) -> MembershipResult<Channel> {
        let result = (|| -> MembershipResult<_> {
            require("message", &message.body)?;
            require("avatar", &message.avatar)?;

            self.write(|tx| {
                let author = Self::load_user(tx, actor)?;
                if message.display_name.trim().is_empty() {
                    message.display_name = author.name;
                }

                let mut channel = Self::load_channel(tx, channel_id)?;
                let posted = channel.post_message(*actor, message)?.clone();
                tx.insert_message(channel_id, &posted)?;
                tx.touch_channel(&channel)?;
                Ok(channel)
            })
        })();
        metrics::observe("post_message", result)
    }

    #[instrument(skip(self, body))]
    fn edit_message(
        &self,
        actor: &UserId,
        channel_id: &ChannelId,
        message_id: &MessageId,
        body: &str,
    ) -> MembershipResult<Channel> {
        let result = (|| -> MembershipResult<_> {
            require("message", body)?;

            self.write(|tx| {
                let mut channel = Self::load_channel(tx, channel_id)?;
                if !channel.is_member(actor) {
                    return Err(MembershipError::Unauthorized("channel membership required"));
                }
                let edited = channel.edit_message(actor, message_id, body.to_string())?.clone();
                tx.update_message(&edited)?;
                tx.touch_channel(&channel)?;
                Ok(channel)
            })
        })();
        metrics::observe("edit_message", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_identity::token::TokenSigner;
    use secrecy::SecretString;
    use std::time::Duration;

    fn setup_manager() -> MembershipCoordinator {
        let store = SqlStore::memory().unwrap();
        let signer = TokenSigner::new(&SecretString::new("invite-secret".to_string()));
        let invites = InviteTokenService::new(signer, Duration::from_secs(3600));
        MembershipCoordinator::new(store, invites, WorkspaceConfig::default())
    }

    fn seed_user(manager: &MembershipCoordinator, name: &str) -> UserId {
        let user = User::new(
            name.to_string(),
            format!("{}@example.com", name.to_lowercase()),
            SecretString::new("hash".to_string()),
        );
        manager.store().transaction(|tx| tx.insert_user(&user)).unwrap();
        user.id
    }

    fn user_workspaces(manager: &MembershipCoordinator, user: &UserId) -> Vec<WorkspaceId> {
        manager
            .store()
            .snapshot(|tx| MembershipCoordinator::load_user(tx, user))
            .unwrap()
            .workspaces
            .to_vec()
    }

    fn join(manager: &MembershipCoordinator, admin: &UserId, ws: &WorkspaceId, user: &UserId) {
        let token = manager.issue_invite(admin, InviteScope::Workspace(*ws)).unwrap();
        manager.join_workspace(user, &token).unwrap();
    }

    #[test]
    fn test_create_workspace_with_general_channel() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");

        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        assert!(ws.is_admin(&alice));
        assert_eq!(ws.channels.len(), 1);

        let general = manager.get_channel(ws.channels.first().unwrap()).unwrap();
        assert_eq!(general.name, "general");
        assert!(general.is_admin(&alice));
        assert_eq!(user_workspaces(&manager, &alice), vec![ws.id]);
    }

    #[test]
    fn test_duplicate_workspace_name() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        manager.create_workspace(&alice, "Acme", "acme.png").unwrap();

        let result = manager.create_workspace(&alice, "Acme", "other.png");
        assert!(matches!(result, Err(MembershipError::DuplicateName(_))));
        assert_eq!(user_workspaces(&manager, &alice).len(), 1);
    }

    #[test]
    fn test_create_workspace_validates_input() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        assert!(matches!(
            manager.create_workspace(&alice, "  ", "acme.png"),
            Err(MembershipError::Invalid(_))
        ));
        assert!(matches!(
            manager.create_workspace(&alice, "Acme", ""),
            Err(MembershipError::Invalid(_))
        ));
        assert!(matches!(
            manager.create_workspace(&UserId::generate(), "Acme", "a.png"),
            Err(MembershipError::NotFound(Entity::User))
        ));
    }

    #[test]
    fn test_join_workspace_adds_both_links_and_general() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();

        join(&manager, &alice, &ws.id, &bob);

        let ws = manager.get_workspace(&ws.id).unwrap();
        assert!(ws.is_member(&bob));
        assert!(!ws.is_admin(&bob));
        assert_eq!(user_workspaces(&manager, &bob), vec![ws.id]);

        let general = manager.get_channel(ws.channels.first().unwrap()).unwrap();
        assert!(general.is_member(&bob));
    }

    #[test]
    fn test_join_twice_fails() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();

        let token = manager.issue_invite(&alice, InviteScope::Workspace(ws.id)).unwrap();
        manager.join_workspace(&bob, &token).unwrap();
        assert!(matches!(manager.join_workspace(&bob, &token), Err(MembershipError::AlreadyMember)));
    }

    #[test]
    fn test_non_admin_cannot_issue_invite() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        join(&manager, &alice, &ws.id, &bob);

        let result = manager.issue_invite(&bob, InviteScope::Workspace(ws.id));
        assert!(matches!(result, Err(MembershipError::Unauthorized(_))));
    }

    #[test]
    fn test_channel_invite_rejected_for_workspace_join() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        let general = *ws.channels.first().unwrap();

        let token = manager.issue_invite(&alice, InviteScope::Channel(general)).unwrap();
        assert!(matches!(
            manager.join_workspace(&bob, &token),
            Err(MembershipError::InvalidOrExpired)
        ));
        assert!(matches!(
            manager.join_workspace(&bob, "not-a-token"),
            Err(MembershipError::InvalidOrExpired)
        ));
    }

    #[test]
    fn test_admin_leaving_backfills() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let carol = seed_user(&manager, "Carol");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        join(&manager, &alice, &ws.id, &bob);
        join(&manager, &alice, &ws.id, &carol);

        let removal = manager.remove_workspace_member(&alice, &ws.id, &alice).unwrap();
        let Removal::Updated(ws) = removal else {
            panic!("workspace should survive");
        };
        assert_eq!(ws.roster.admins().to_vec(), vec![carol]);
        assert!(user_workspaces(&manager, &alice).is_empty());
    }

    #[test]
    fn test_member_cannot_remove_others() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        join(&manager, &alice, &ws.id, &bob);

        let result = manager.remove_workspace_member(&bob, &ws.id, &alice);
        assert!(matches!(result, Err(MembershipError::Unauthorized(_))));
        assert!(manager.get_workspace(&ws.id).unwrap().is_member(&alice));
    }

    #[test]
    fn test_last_member_leaving_deletes_workspace() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        let general = *ws.channels.first().unwrap();

        let removal = manager.remove_workspace_member(&alice, &ws.id, &alice).unwrap();
        assert_eq!(removal, Removal::Deleted);
        assert!(matches!(manager.get_workspace(&ws.id), Err(MembershipError::NotFound(_))));
        assert!(matches!(manager.get_channel(&general), Err(MembershipError::NotFound(_))));
        assert!(user_workspaces(&manager, &alice).is_empty());

        // The name is free again
        manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
    }

    #[test]
    fn test_promote_and_demote() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let outsider = seed_user(&manager, "Eve");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        join(&manager, &alice, &ws.id, &bob);

        assert!(matches!(
            manager.promote_workspace_admin(&alice, &ws.id, &outsider),
            Err(MembershipError::NotMember)
        ));
        assert!(matches!(
            manager.promote_workspace_admin(&bob, &ws.id, &bob),
            Err(MembershipError::Unauthorized(_))
        ));

        let ws_after = manager.promote_workspace_admin(&alice, &ws.id, &bob).unwrap();
        assert!(ws_after.is_admin(&bob));
        assert!(matches!(
            manager.promote_workspace_admin(&alice, &ws.id, &bob),
            Err(MembershipError::AlreadyAdmin)
        ));

        let ws_after = manager.demote_workspace_admin(&bob, &ws.id, &alice).unwrap();
        assert_eq!(ws_after.roster.admins().to_vec(), vec![bob]);
        assert!(matches!(
            manager.demote_workspace_admin(&bob, &ws.id, &alice),
            Err(MembershipError::NotAdmin)
        ));
    }

    #[test]
    fn test_delete_workspace_cascades() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        join(&manager, &alice, &ws.id, &bob);
        let extra = manager.create_channel(&bob, &ws.id, "random", "r.png").unwrap();

        assert!(matches!(
            manager.delete_workspace(&bob, &ws.id),
            Err(MembershipError::Unauthorized(_))
        ));
        manager.delete_workspace(&alice, &ws.id).unwrap();

        assert!(user_workspaces(&manager, &alice).is_empty());
        assert!(user_workspaces(&manager, &bob).is_empty());
        assert!(matches!(manager.get_channel(&extra.id), Err(MembershipError::NotFound(_))));
    }

    #[test]
    fn test_channel_lifecycle() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();

        assert!(matches!(
            manager.create_channel(&bob, &ws.id, "random", "r.png"),
            Err(MembershipError::Unauthorized(_))
        ));

        let channel = manager.create_channel(&alice, &ws.id, "random", "r.png").unwrap();
        assert_eq!(manager.get_workspace(&ws.id).unwrap().channels.len(), 2);

        let renamed = manager.update_channel(&alice, &channel.id, Some("chat"), None).unwrap();
        assert_eq!(renamed.name, "chat");
        assert_eq!(renamed.logo, "r.png");

        manager.delete_channel(&alice, &channel.id).unwrap();
        let ws = manager.get_workspace(&ws.id).unwrap();
        assert_eq!(ws.channels.len(), 1);
        assert!(!ws.channels.contains(&channel.id));
    }

    #[test]
    fn test_add_channel_member_requires_workspace_membership() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        let channel = manager.create_channel(&alice, &ws.id, "random", "r.png").unwrap();

        assert!(matches!(
            manager.add_channel_member(&alice, &channel.id, &bob),
            Err(MembershipError::NotMember)
        ));

        join(&manager, &alice, &ws.id, &bob);
        let channel = manager.add_channel_member(&alice, &channel.id, &bob).unwrap();
        assert!(channel.is_member(&bob));
        assert!(matches!(
            manager.add_channel_member(&alice, &channel.id, &bob),
            Err(MembershipError::AlreadyMember)
        ));
    }

    #[test]
    fn test_last_channel_member_leaving_deletes_channel() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        let channel = manager.create_channel(&alice, &ws.id, "random", "r.png").unwrap();

        let removal = manager.remove_channel_member(&alice, &channel.id, &alice).unwrap();
        assert_eq!(removal, Removal::Deleted);
        assert!(!manager.get_workspace(&ws.id).unwrap().channels.contains(&channel.id));
    }

    #[test]
    fn test_join_channel_by_invite() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        let channel = manager.create_channel(&alice, &ws.id, "random", "r.png").unwrap();

        let token = manager.issue_invite(&alice, InviteScope::Channel(channel.id)).unwrap();
        assert!(matches!(
            manager.join_channel(&bob, &token),
            Err(MembershipError::Unauthorized(_))
        ));
        assert!(!manager.get_channel(&channel.id).unwrap().is_member(&bob));

        join(&manager, &alice, &ws.id, &bob);
        let joined = manager.join_channel(&bob, &token).unwrap();
        assert!(joined.is_member(&bob));
        assert!(matches!(manager.join_channel(&bob, &token), Err(MembershipError::AlreadyMember)));
    }

    #[test]
    fn test_removed_member_loses_channel_access() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        let general = *ws.channels.first().unwrap();
        join(&manager, &alice, &ws.id, &bob);

        // bob runs one channel alone and shares another with alice as its only admin
        let solo = manager.create_channel(&bob, &ws.id, "bob-notes", "b.png").unwrap();
        let shared = manager.create_channel(&bob, &ws.id, "shared", "s.png").unwrap();
        manager.add_channel_member(&bob, &shared.id, &alice).unwrap();

        let removal = manager.remove_workspace_member(&alice, &ws.id, &bob).unwrap();
        let Removal::Updated(ws) = removal else {
            panic!("workspace should survive");
        };

        assert!(!manager.get_channel(&general).unwrap().is_member(&bob));
        assert!(matches!(
            manager.get_channel(&solo.id),
            Err(MembershipError::NotFound(Entity::Channel))
        ));
        assert!(!ws.channels.contains(&solo.id));
        assert_eq!(manager.get_workspace(&ws.id).unwrap().channels, ws.channels);

        let shared = manager.get_channel(&shared.id).unwrap();
        assert_eq!(shared.roster.members().to_vec(), vec![alice]);
        assert_eq!(shared.roster.admins().to_vec(), vec![alice]);

        let attempt = manager.post_message(
            &bob,
            &general,
            NewMessage {
                body: "still here?".to_string(),
                kind: None,
                display_name: String::new(),
                avatar: "b.png".to_string(),
            },
        );
        assert!(matches!(attempt, Err(MembershipError::NotMember)));
    }

    #[test]
    fn test_post_and_edit_messages() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        let general = *ws.channels.first().unwrap();
        join(&manager, &alice, &ws.id, &bob);

        let post = |author: &UserId, body: &str| {
            manager.post_message(
                author,
                &general,
                NewMessage {
                    body: body.to_string(),
                    kind: None,
                    display_name: "someone".to_string(),
                    avatar: "a.png".to_string(),
                },
            )
        };

        post(&alice, "hello").unwrap();
        let channel = post(&bob, "hi alice").unwrap();
        assert_eq!(channel.history[0].body, "hi alice");
        assert_eq!(channel.history[1].body, "hello");
        assert_eq!(manager.get_channel(&general).unwrap().updated_at, channel.updated_at);

        let alice_msg = channel.history[1].id;
        assert!(matches!(
            manager.edit_message(&bob, &general, &alice_msg, "hacked"),
            Err(MembershipError::Unauthorized(_))
        ));
        assert!(matches!(
            manager.edit_message(&alice, &general, &MessageId::generate(), "x"),
            Err(MembershipError::NotFound(Entity::Message))
        ));

        let channel = manager.edit_message(&alice, &general, &alice_msg, "hello all").unwrap();
        assert_eq!(channel.message(&alice_msg).unwrap().body, "hello all");

        let reloaded = manager.get_channel(&general).unwrap();
        assert_eq!(reloaded.updated_at, channel.updated_at);
        assert_eq!(reloaded.message(&alice_msg).unwrap().body, "hello all");
        assert!(reloaded.message(&alice_msg).unwrap().edited_at.is_some());

        let outsider = seed_user(&manager, "Eve");
        assert!(matches!(post(&outsider, "spam"), Err(MembershipError::NotMember)));
        assert!(matches!(post(&alice, "  "), Err(MembershipError::Invalid(_))));
    }

    #[test]
    fn test_post_without_display_name_uses_account_name() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let ws = manager.create_workspace(&alice, "Acme", "acme.png").unwrap();
        let general = *ws.channels.first().unwrap();

        let channel = manager
            .post_message(
                &alice,
                &general,
                NewMessage {
                    body: "hello".to_string(),
                    kind: None,
                    display_name: " ".to_string(),
                    avatar: "a.png".to_string(),
                },
            )
            .unwrap();
        assert_eq!(channel.history[0].display_name, "Alice");

        let missing_avatar = manager.post_message(
            &alice,
            &general,
            NewMessage {
                body: "hello".to_string(),
                kind: None,
                display_name: "Al".to_string(),
                avatar: String::new(),
            },
        );
        assert!(matches!(missing_avatar, Err(MembershipError::Invalid(_))));
    }

    #[test]
    fn test_list_user_workspaces_in_join_order() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        let bob = seed_user(&manager, "Bob");
        let first = manager.create_workspace(&alice, "First", "1.png").unwrap();
        let second = manager.create_workspace(&bob, "Second", "2.png").unwrap();
        join(&manager, &bob, &second.id, &alice);

        let names: Vec<_> = manager
            .list_user_workspaces(&alice)
            .unwrap()
            .into_iter()
            .map(|w| w.name)
            .collect();
        assert_eq!(names, vec!["First".to_string(), "Second".to_string()]);
        assert_eq!(first.name, "First");
    }

    #[test]
    fn test_update_workspace_rename_conflict() {
        let manager = setup_manager();
        let alice = seed_user(&manager, "Alice");
        manager.create_workspace(&alice, "First", "1.png").unwrap();
        let second = manager.create_workspace(&alice, "Second", "2.png").unwrap();

        assert!(matches!(
            manager.update_workspace(&alice, &second.id, Some("First"), None),
            Err(MembershipError::DuplicateName(_))
        ));
        let same = manager.update_workspace(&alice, &second.id, Some("Second"), Some("new.png")).unwrap();
        assert_eq!(same.logo, "new.png");
    }
}
