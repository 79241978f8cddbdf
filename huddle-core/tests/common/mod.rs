//! Shared setup for integration tests

#![allow(dead_code)]

use secrecy::SecretString;
use std::time::Duration;

use huddle_core::config::WorkspaceConfig;
use huddle_core::core_identity::{TokenSigner, User};
use huddle_core::core_space::{
    InviteScope, MembershipCoordinator, MembershipManager, SqlStore, UserId, WorkspaceId,
};

pub fn coordinator(store: SqlStore) -> MembershipCoordinator {
    let signer = TokenSigner::new(&SecretString::new("integration-invite-secret".to_string()));
    let invites = huddle_core::core_space::InviteTokenService::new(signer, Duration::from_secs(3600));
    MembershipCoordinator::new(store, invites, WorkspaceConfig::default())
}

pub fn memory_coordinator() -> MembershipCoordinator {
    coordinator(SqlStore::memory().unwrap())
}

pub fn seed_user(manager: &MembershipCoordinator, name: &str) -> UserId {
    let user = User::new(
        name.to_string(),
        format!("{}@example.com", name.to_lowercase()),
        SecretString::new("not-a-real-hash".to_string()),
    );
    manager.store().transaction(|tx| tx.insert_user(&user)).unwrap();
    user.id
}

pub fn load_user(manager: &MembershipCoordinator, id: &UserId) -> User {
    manager
        .store()
        .snapshot(|tx| tx.get_user(id))
        .unwrap()
        .expect("user exists")
}

pub fn invite_and_join(
    manager: &MembershipCoordinator,
    admin: &UserId,
    workspace: &WorkspaceId,
    user: &UserId,
) {
    let token = manager.issue_invite(admin, InviteScope::Workspace(*workspace)).unwrap();
    manager.join_workspace(user, &token).unwrap();
}
