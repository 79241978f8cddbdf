//! Concurrent mutations against a file-backed store

mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::{coordinator, load_user, seed_user};
use huddle_core::core_space::{
    ChannelManager, Entity, InviteScope, MembershipError, MembershipManager, NewMessage, SqlStore,
    WorkspaceManager,
};

fn file_coordinator(dir: &tempfile::TempDir) -> huddle_core::core_space::MembershipCoordinator {
    let store = SqlStore::open(dir.path().join("huddle.db"), 8, Duration::from_secs(5)).unwrap();
    coordinator(store)
}

#[test]
fn concurrent_joins_keep_both_sides_in_sync() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(file_coordinator(&dir));
    let owner = seed_user(&manager, "Owner");
    let joiners: Vec<_> = (0..8).map(|i| seed_user(&manager, &format!("Joiner{}", i))).collect();

    let ws = manager.create_workspace(&owner, "Busy", "b.png").unwrap();
    let token = manager.issue_invite(&owner, InviteScope::Workspace(ws.id)).unwrap();

    let barrier = Arc::new(Barrier::new(joiners.len()));
    let handles: Vec<_> = joiners
        .iter()
        .copied()
        .map(|user| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let token = token.clone();
            thread::spawn(move || {
                barrier.wait();
                // a contended write may surface as Conflict; a retry must then succeed
                match manager.join_workspace(&user, &token) {
                    Err(MembershipError::Conflict) => manager.join_workspace(&user, &token).map(|_| ()),
                    other => other.map(|_| ()),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let ws = manager.get_workspace(&ws.id).unwrap();
    assert_eq!(ws.roster.members().len(), joiners.len() + 1);
    assert_eq!(ws.roster.admins().to_vec(), vec![owner]);
    let general = manager.get_channel(&ws.channels.to_vec()[0]).unwrap();
    for user in &joiners {
        assert!(ws.is_member(user));
        assert!(general.is_member(user));
        assert_eq!(load_user(&manager, user).workspaces.to_vec(), vec![ws.id]);
    }
}

#[test]
fn concurrent_posts_are_all_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(file_coordinator(&dir));
    let author = seed_user(&manager, "Author");
    let ws = manager.create_workspace(&author, "Chat", "c.png").unwrap();
    let channel_id = ws.channels.to_vec()[0];

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for i in 0..5 {
                    let message = NewMessage {
                        body: format!("thread {} message {}", t, i),
                        kind: None,
                        display_name: "Author".to_string(),
                        avatar: "a.png".to_string(),
                    };
                    loop {
                        match manager.post_message(&author, &channel_id, message.clone()) {
                            Err(MembershipError::Conflict) => thread::yield_now(),
                            other => {
                                other.unwrap();
                                break;
                            }
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let channel = manager.get_channel(&channel_id).unwrap();
    assert_eq!(channel.history.len(), 20);
}

/// Run `op`, retrying while the store reports lock contention
fn retry_on_conflict<T>(mut op: impl FnMut() -> Result<T, MembershipError>) -> Result<T, MembershipError> {
    loop {
        match op() {
            Err(MembershipError::Conflict) => thread::yield_now(),
            other => return other,
        }
    }
}

#[test]
fn concurrent_leaves_lose_no_update() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(file_coordinator(&dir));
    let owner = seed_user(&manager, "Owner");
    let leavers: Vec<_> = (0..6).map(|i| seed_user(&manager, &format!("Leaver{}", i))).collect();

    let ws = manager.create_workspace(&owner, "Exodus", "e.png").unwrap();
    let general = ws.channels.to_vec()[0];
    let token = manager.issue_invite(&owner, InviteScope::Workspace(ws.id)).unwrap();
    for user in &leavers {
        manager.join_workspace(user, &token).unwrap();
    }

    let barrier = Arc::new(Barrier::new(leavers.len()));
    let handles: Vec<_> = leavers
        .iter()
        .copied()
        .map(|user| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let ws_id = ws.id;
            thread::spawn(move || {
                barrier.wait();
                retry_on_conflict(|| manager.remove_workspace_member(&user, &ws_id, &user))
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let ws = manager.get_workspace(&ws.id).unwrap();
    assert_eq!(ws.roster.members().to_vec(), vec![owner]);
    assert_eq!(ws.roster.admins().to_vec(), vec![owner]);
    assert_eq!(manager.get_channel(&general).unwrap().roster.members().to_vec(), vec![owner]);
    for user in &leavers {
        assert!(load_user(&manager, user).workspaces.is_empty());
    }
}

#[test]
fn join_racing_delete_leaves_no_dangling_link() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(file_coordinator(&dir));
    let owner = seed_user(&manager, "Owner");
    let joiner = seed_user(&manager, "Joiner");

    for round in 0..10 {
        let ws = manager.create_workspace(&owner, &format!("Race{}", round), "r.png").unwrap();
        let general = ws.channels.to_vec()[0];
        let token = manager.issue_invite(&owner, InviteScope::Workspace(ws.id)).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let join = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                retry_on_conflict(|| manager.join_workspace(&joiner, &token))
            })
        };
        let delete = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let ws_id = ws.id;
            thread::spawn(move || {
                barrier.wait();
                retry_on_conflict(|| manager.delete_workspace(&owner, &ws_id))
            })
        };

        delete.join().unwrap().unwrap();
        match join.join().unwrap() {
            Ok(_) | Err(MembershipError::NotFound(Entity::Workspace)) => {}
            Err(other) => panic!("unexpected join failure: {:?}", other),
        }

        assert!(manager.get_workspace(&ws.id).is_err());
        assert!(manager.get_channel(&general).is_err());
        assert!(!load_user(&manager, &joiner).workspaces.contains(&ws.id));
        assert!(!load_user(&manager, &owner).workspaces.contains(&ws.id));
    }
}

#[test]
fn data_survives_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let (owner, ws_id) = {
        let manager = file_coordinator(&dir);
        let owner = seed_user(&manager, "Owner");
        let ws = manager.create_workspace(&owner, "Durable", "d.png").unwrap();
        (owner, ws.id)
    };

    let manager = file_coordinator(&dir);
    let ws = manager.get_workspace(&ws_id).unwrap();
    assert_eq!(ws.name, "Durable");
    assert!(ws.roster.is_admin(&owner));
    assert_eq!(manager.list_user_workspaces(&owner).unwrap().len(), 1);
}
