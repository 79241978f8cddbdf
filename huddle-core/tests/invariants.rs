//! Property tests: membership invariants hold across random operation sequences

mod common;

use proptest::prelude::*;

use common::{load_user, memory_coordinator, seed_user};
use huddle_core::core_space::{
    Channel, ChannelId, ChannelManager, InviteScope, MembershipCoordinator, MembershipError,
    MembershipManager, Roster, UserId, WorkspaceId, WorkspaceManager,
};

const USERS: usize = 5;

#[derive(Debug, Clone)]
enum Op {
    Join(usize),
    Leave(usize),
    Remove { actor: usize, target: usize },
    Promote { actor: usize, target: usize },
    Demote { actor: usize, target: usize },
    OpenChannel(usize),
    JoinChannel { user: usize, channel: usize },
    LeaveChannel { user: usize, channel: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let user = 0..USERS;
    let channel = 0..4usize;
    prop_oneof![
        3 => user.clone().prop_map(Op::Join),
        1 => user.clone().prop_map(Op::Leave),
        1 => (user.clone(), user.clone()).prop_map(|(actor, target)| Op::Remove { actor, target }),
        2 => (user.clone(), user.clone()).prop_map(|(actor, target)| Op::Promote { actor, target }),
        1 => (user.clone(), user.clone()).prop_map(|(actor, target)| Op::Demote { actor, target }),
        1 => user.clone().prop_map(Op::OpenChannel),
        2 => (user.clone(), channel.clone()).prop_map(|(user, channel)| Op::JoinChannel { user, channel }),
        1 => (user, channel).prop_map(|(user, channel)| Op::LeaveChannel { user, channel }),
    ]
}

/// Apply one op. Rejected ops are expected and ignored; they must leave the
/// state untouched, which the invariant check covers.
fn apply(
    manager: &MembershipCoordinator,
    users: &[UserId],
    ws: &WorkspaceId,
    channels: &mut Vec<ChannelId>,
    op: &Op,
) {
    let _ = match *op {
        Op::Join(i) => {
            // any current admin issues the invite
            let Ok(workspace) = manager.get_workspace(ws) else { return };
            let Some(admin) = workspace.roster.admins().first().copied() else { return };
            manager
                .issue_invite(&admin, InviteScope::Workspace(*ws))
                .and_then(|token| manager.join_workspace(&users[i], &token))
                .map(|_| ())
        }
        Op::Leave(i) => manager.remove_workspace_member(&users[i], ws, &users[i]).map(|_| ()),
        Op::Remove { actor, target } => manager
            .remove_workspace_member(&users[actor], ws, &users[target])
            .map(|_| ()),
        Op::Promote { actor, target } => manager
            .promote_workspace_admin(&users[actor], ws, &users[target])
            .map(|_| ()),
        Op::Demote { actor, target } => manager
            .demote_workspace_admin(&users[actor], ws, &users[target])
            .map(|_| ()),
        Op::OpenChannel(i) => {
            let name = format!("room-{}", channels.len());
            manager.create_channel(&users[i], ws, &name, "r.png").map(|channel| {
                channels.push(channel.id);
            })
        }
        Op::JoinChannel { user, channel } => {
            let Some(id) = channels.get(channel) else { return };
            let Ok(current) = manager.get_channel(id) else { return };
            let Some(admin) = current.roster.admins().first().copied() else { return };
            manager
                .issue_invite(&admin, InviteScope::Channel(*id))
                .and_then(|token| manager.join_channel(&users[user], &token))
                .map(|_| ())
        }
        Op::LeaveChannel { user, channel } => {
            let Some(id) = channels.get(channel) else { return };
            manager.remove_channel_member(&users[user], id, &users[user]).map(|_| ())
        }
    };
}

fn check_roster(roster: &Roster) {
    let members = roster.members();
    let admins = roster.admins();
    assert!(!members.is_empty(), "live aggregate with no members");
    assert!(!admins.is_empty(), "members but no admin");
    assert!(admins.iter().all(|a| members.contains(a)), "admin outside members");
}

fn check_invariants(
    manager: &MembershipCoordinator,
    users: &[UserId],
    ws: &WorkspaceId,
    channels: &[ChannelId],
) {
    match manager.get_workspace(ws) {
        Ok(workspace) => {
            check_roster(&workspace.roster);
            let members = workspace.roster.members();

            for user in users {
                let listed = load_user(manager, user).workspaces.contains(ws);
                assert_eq!(listed, members.contains(user), "membership not symmetric");
            }

            for channel_id in workspace.channels.iter() {
                let channel: Channel = manager.get_channel(channel_id).expect("listed channel exists");
                check_roster(&channel.roster);
                assert!(
                    channel.roster.members().iter().all(|m| members.contains(m)),
                    "channel member outside the workspace"
                );
            }
            for channel_id in channels {
                if !workspace.channels.contains(channel_id) {
                    assert!(manager.get_channel(channel_id).is_err(), "detached channel still stored");
                }
            }
        }
        Err(_) => {
            for user in users {
                assert!(!load_user(manager, user).workspaces.contains(ws), "dangling workspace");
            }
            for channel_id in channels {
                assert!(matches!(
                    manager.get_channel(channel_id),
                    Err(MembershipError::NotFound(_))
                ));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_workspace_membership_invariants(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let manager = memory_coordinator();
        let users: Vec<_> = (0..USERS).map(|i| seed_user(&manager, &format!("User{}", i))).collect();
        let workspace = manager.create_workspace(&users[0], "Prop", "p.png").unwrap();
        let ws = workspace.id;
        let mut channels = workspace.channels.to_vec();

        check_invariants(&manager, &users, &ws, &channels);
        for op in &ops {
            apply(&manager, &users, &ws, &mut channels, op);
            check_invariants(&manager, &users, &ws, &channels);
        }
    }
}
