//! Registered user record

use secrecy::SecretString;
use serde::Serialize;

use crate::core_space::ordered_set::OrderedSet;
use crate::core_space::types::{Timestamp, UserId, WorkspaceId};

/// A registered account. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,

    /// Lowercased, unique across users
    pub email: String,

    #[serde(skip_serializing)]
    pub password_hash: SecretString,

    pub avatar: Option<String>,

    /// Workspaces this user belongs to, in join order
    pub workspaces: OrderedSet<WorkspaceId>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn new(name: String, email: String, password_hash: SecretString) -> Self {
        let now = Timestamp::now();
        User {
            id: UserId::generate(),
            name,
            email,
            password_hash,
            avatar: None,
            workspaces: OrderedSet::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
