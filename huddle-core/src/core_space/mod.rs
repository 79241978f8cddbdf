//! Workspaces, channels and membership
//!
//! ## Layout
//!
//! - **Aggregates**: [`Workspace`] and [`Channel`], each owning a [`Roster`]
//!   of members and admins
//! - **Coordinator**: [`MembershipCoordinator`] applies every operation that
//!   touches more than one aggregate inside a single store transaction
//! - **Invites**: signed, expiring tokens naming a workspace or channel
//! - **Storage**: SQLite through an r2d2 pool
//!
//! ## Invariants
//!
//! 1. Every admin is a member
//! 2. A roster with members has at least one admin
//! 3. A user lists a workspace iff the workspace lists the user
//! 4. Every channel member is a member of the channel's workspace

pub mod channel;
pub mod invite;
pub mod manager;
pub mod manager_impl;
pub mod ordered_set;
pub mod roster;
pub mod storage;
pub mod types;
pub mod workspace;

pub use channel::{Channel, ChannelError, Message, NewMessage};
pub use invite::{InviteError, InviteScope, InviteTokenService};
pub use manager::{
    ChannelManager, Entity, MembershipError, MembershipManager, MembershipResult, Removal,
    WorkspaceManager,
};
pub use manager_impl::MembershipCoordinator;
pub use ordered_set::{MemberSet, OrderedSet};
pub use roster::{Roster, RosterError};
pub use storage::{SqlStore, StoreError};
pub use types::{ChannelId, MessageId, Timestamp, UserId, WorkspaceId};
pub use workspace::{Workspace, WorkspaceError};
