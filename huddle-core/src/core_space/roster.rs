//! Member and admin lists shared by workspaces and channels

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ordered_set::MemberSet;
use super::types::UserId;

/// Errors from roster transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("User is already a member")]
    AlreadyMember,

    #[error("User is not a member")]
    NotMember,

    #[error("User is already an admin")]
    AlreadyAdmin,

    #[error("User is not an admin")]
    NotAdmin,
}

/// Members plus the subset of them that are admins.
///
/// Every admin is a member, and a roster with members always has at
/// least one admin. When a change would leave no admins, the most
/// recently added remaining member is promoted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    members: MemberSet,
    admins: MemberSet,
}

impl Roster {
    /// Roster whose single member is also its admin
    pub fn with_founder(founder: UserId) -> Self {
        let mut members = MemberSet::new();
        members.insert(founder);
        let mut admins = MemberSet::new();
        admins.insert(founder);
        Roster { members, admins }
    }

    /// Rebuild a roster from persisted lists. Admins that are not members
    /// are dropped and a missing admin is backfilled.
    pub fn from_parts(members: MemberSet, admins: MemberSet) -> Self {
        let admins: MemberSet = admins.iter().filter(|a| members.contains(a)).copied().collect();
        let mut roster = Roster { members, admins };
        roster.backfill_admin();
        roster
    }

    pub fn members(&self) -> &MemberSet {
        &self.members
    }

    pub fn admins(&self) -> &MemberSet {
        &self.admins
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admins.contains(user)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn add_member(&mut self, user: UserId) -> Result<(), RosterError> {
        if !self.members.insert(user) {
            return Err(RosterError::AlreadyMember);
        }
        self.backfill_admin();
        Ok(())
    }

    /// Remove a member (and their admin role). Returns the member promoted
    /// to keep the roster administered, if any.
    pub fn remove_member(&mut self, user: &UserId) -> Result<Option<UserId>, RosterError> {
        if !self.members.remove(user) {
            return Err(RosterError::NotMember);
        }
        self.admins.remove(user);
        Ok(self.backfill_admin())
    }

    pub fn promote(&mut self, user: UserId) -> Result<(), RosterError> {
        if self.admins.contains(&user) {
            return Err(RosterError::AlreadyAdmin);
        }
        if !self.members.contains(&user) {
            return Err(RosterError::NotMember);
        }
        self.admins.insert(user);
        Ok(())
    }

    /// Drop an admin role. Demoting the last admin promotes the most
    /// recently added member, which may be the same user.
    pub fn demote(&mut self, user: &UserId) -> Result<Option<UserId>, RosterError> {
        if !self.admins.remove(user) {
            return Err(RosterError::NotAdmin);
        }
        Ok(self.backfill_admin())
    }

    /// Check the admin invariants without modifying anything
    pub fn is_consistent(&self) -> bool {
        let admins_are_members = self.admins.iter().all(|a| self.members.contains(a));
        let administered = self.members.is_empty() || !self.admins.is_empty();
        admins_are_members && administered
    }

    fn backfill_admin(&mut self) -> Option<UserId> {
        if !self.admins.is_empty() {
            return None;
        }
        let next = *self.members.last()?;
        self.admins.insert(next);
        Some(next)
    }
}
