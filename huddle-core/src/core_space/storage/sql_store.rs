//! SQLite storage for users, workspaces and channels
//!
//! All reads and writes go through [`SqlStore::transaction`] or
//! [`SqlStore::snapshot`]. A transaction either commits every change made
//! through its [`StoreTx`] or none of them. Write transactions start
//! `IMMEDIATE`, so concurrent writers are serialized by SQLite and a
//! read-modify-write cycle never loses an update.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::time::Duration;

use super::error::StoreError;
use super::migrations::migrate;
use crate::core_identity::user::User;
use crate::core_space::channel::{Channel, Message};
use crate::core_space::ordered_set::{MemberSet, OrderedSet};
use crate::core_space::roster::Roster;
use crate::core_space::types::{ChannelId, MessageId, UserId, WorkspaceId};
use crate::core_space::workspace::Workspace;

/// Pooled SQLite store
#[derive(Clone)]
pub struct SqlStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlStore {
    /// Wrap an existing pool and run pending migrations
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, StoreError> {
        migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>, pool_size: u32, busy_timeout: Duration) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "foreign_keys", true)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
            Ok(())
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        Self::new(pool)
    }

    /// In-memory store. Uses a single connection, since every in-memory
    /// connection would otherwise see its own empty database.
    pub fn memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.pragma_update(None, "foreign_keys", true));
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::new(pool)
    }

    /// Run `f` inside a write transaction. Commits when `f` returns Ok.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Run `f` against a consistent read snapshot
    pub fn snapshot<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.run(TransactionBehavior::Deferred, f)
    }

    /// Cheap liveness probe
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn run<T, E, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.pool.get().map_err(StoreError::from)?;
        let tx = conn.transaction_with_behavior(behavior).map_err(StoreError::from)?;
        let store_tx = StoreTx { tx };
        let value = f(&store_tx)?;
        store_tx.tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

/// Handle to an open transaction
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
}

impl StoreTx<'_> {
    // ===== Users =====

    pub fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO users (id, name, email, password_hash, avatar, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                user.id,
                user.name,
                user.email,
                user.password_hash.expose_secret(),
                user.avatar,
                user.created_at,
                user.updated_at,
            ],
        )?;
        self.write_user_workspaces(user)
    }

    pub fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let user = self
            .tx
            .query_row(
                "SELECT id, name, email, password_hash, avatar, created_at, updated_at
                 FROM users WHERE id = ?",
                params![id],
                user_from_row,
            )
            .optional()?;
        user.map(|u| self.with_workspaces(u)).transpose()
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = self
            .tx
            .query_row(
                "SELECT id, name, email, password_hash, avatar, created_at, updated_at
                 FROM users WHERE email = ?",
                params![email],
                user_from_row,
            )
            .optional()?;
        user.map(|u| self.with_workspaces(u)).transpose()
    }

    /// Persist profile fields, password hash and workspace list
    pub fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE users SET name = ?, email = ?, password_hash = ?, avatar = ?, updated_at = ?
             WHERE id = ?",
            params![
                user.name,
                user.email,
                user.password_hash.expose_secret(),
                user.avatar,
                user.updated_at,
                user.id,
            ],
        )?;
        self.write_user_workspaces(user)
    }

    fn with_workspaces(&self, mut user: User) -> Result<User, StoreError> {
        user.workspaces = self.load_ordered(
            "SELECT workspace_id FROM user_workspaces WHERE user_id = ? ORDER BY position",
            &user.id,
        )?;
        Ok(user)
    }

    fn write_user_workspaces(&self, user: &User) -> Result<(), StoreError> {
        self.replace_list(
            "DELETE FROM user_workspaces WHERE user_id = ?",
            "INSERT INTO user_workspaces (user_id, workspace_id, position) VALUES (?, ?, ?)",
            &user.id,
            &user.workspaces,
        )
    }

    // ===== Workspaces =====

    pub fn workspace_name_taken(
        &self,
        name: &str,
        except: Option<&WorkspaceId>,
    ) -> Result<bool, StoreError> {
        let existing: Option<WorkspaceId> = self
            .tx
            .query_row("SELECT id FROM workspaces WHERE name = ?", params![name], |row| row.get(0))
            .optional()?;
        Ok(match existing {
            Some(id) => except != Some(&id),
            None => false,
        })
    }

    pub fn insert_workspace(&self, workspace: &Workspace) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO workspaces (id, name, logo, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                workspace.id,
                workspace.name,
                workspace.logo,
                workspace.created_by,
                workspace.created_at,
                workspace.updated_at,
            ],
        )?;
        self.write_workspace_lists(workspace)
    }

    pub fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>, StoreError> {
        let row = self
            .tx
            .query_row(
                "SELECT id, name, logo, created_by, created_at, updated_at
                 FROM workspaces WHERE id = ?",
                params![id],
                |row| {
                    Ok(Workspace {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        logo: row.get(2)?,
                        created_by: row.get(3)?,
                        channels: OrderedSet::new(),
                        roster: Roster::default(),
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        let Some(mut workspace) = row else {
            return Ok(None);
        };

        let members: MemberSet = self.load_ordered(
            "SELECT user_id FROM workspace_members WHERE workspace_id = ? ORDER BY position",
            id,
        )?;
        let admins: MemberSet = self.load_ordered(
            "SELECT user_id FROM workspace_admins WHERE workspace_id = ? ORDER BY position",
            id,
        )?;
        workspace.roster = Roster::from_parts(members, admins);
        workspace.channels = self.load_ordered(
            "SELECT channel_id FROM workspace_channels WHERE workspace_id = ? ORDER BY position",
            id,
        )?;

        Ok(Some(workspace))
    }

    /// Persist metadata, roster and channel list
    pub fn save_workspace(&self, workspace: &Workspace) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE workspaces SET name = ?, logo = ?, updated_at = ? WHERE id = ?",
            params![workspace.name, workspace.logo, workspace.updated_at, workspace.id],
        )?;
        self.write_workspace_lists(workspace)
    }

    pub fn delete_workspace(&self, id: &WorkspaceId) -> Result<bool, StoreError> {
        let deleted = self.tx.execute("DELETE FROM workspaces WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    fn write_workspace_lists(&self, workspace: &Workspace) -> Result<(), StoreError> {
        self.replace_list(
            "DELETE FROM workspace_members WHERE workspace_id = ?",
            "INSERT INTO workspace_members (workspace_id, user_id, position) VALUES (?, ?, ?)",
            &workspace.id,
            workspace.roster.members(),
        )?;
        self.replace_list(
            "DELETE FROM workspace_admins WHERE workspace_id = ?",
            "INSERT INTO workspace_admins (workspace_id, user_id, position) VALUES (?, ?, ?)",
            &workspace.id,
            workspace.roster.admins(),
        )?;
        self.replace_list(
            "DELETE FROM workspace_channels WHERE workspace_id = ?",
            "INSERT INTO workspace_channels (workspace_id, channel_id, position) VALUES (?, ?, ?)",
            &workspace.id,
            &workspace.channels,
        )
    }

    // ===== Channels =====

    /// Insert a channel with its roster and any messages it already holds
    pub fn insert_channel(&self, channel: &Channel) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO channels (id, workspace_id, name, logo, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                channel.id,
                channel.workspace_id,
                channel.name,
                channel.logo,
                channel.created_by,
                channel.created_at,
                channel.updated_at,
            ],
        )?;
        self.write_channel_roster(channel)?;
        for message in channel.history.iter().rev() {
            self.insert_message(&channel.id, message)?;
        }
        Ok(())
    }

    /// Load a channel with its full history, newest message first
    pub fn get_channel(&self, id: &ChannelId) -> Result<Option<Channel>, StoreError> {
        let row = self
            .tx
            .query_row(
                "SELECT id, workspace_id, name, logo, created_by, created_at, updated_at
                 FROM channels WHERE id = ?",
                params![id],
                |row| {
                    Ok(Channel {
                        id: row.get(0)?,
                        workspace_id: row.get(1)?,
                        name: row.get(2)?,
                        logo: row.get(3)?,
                        created_by: row.get(4)?,
                        roster: Roster::default(),
                        history: Vec::new(),
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()?;

        let Some(mut channel) = row else {
            return Ok(None);
        };

        let members: MemberSet = self.load_ordered(
            "SELECT user_id FROM channel_members WHERE channel_id = ? ORDER BY position",
            id,
        )?;
        let admins: MemberSet = self.load_ordered(
            "SELECT user_id FROM channel_admins WHERE channel_id = ? ORDER BY position",
            id,
        )?;
        channel.roster = Roster::from_parts(members, admins);

        let mut stmt = self.tx.prepare(
            "SELECT id, author_id, display_name, avatar, kind, body, created_at, edited_at
             FROM channel_messages WHERE channel_id = ?
             ORDER BY created_at DESC, rowid DESC",
        )?;
        channel.history = stmt
            .query_map(params![id], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(channel))
    }

    /// Persist metadata and roster. Messages are written separately.
    pub fn save_channel(&self, channel: &Channel) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE channels SET name = ?, logo = ?, updated_at = ? WHERE id = ?",
            params![channel.name, channel.logo, channel.updated_at, channel.id],
        )?;
        self.write_channel_roster(channel)
    }

    /// Bump `updated_at` without rewriting the roster
    pub fn touch_channel(&self, channel: &Channel) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE channels SET updated_at = ? WHERE id = ?",
            params![channel.updated_at, channel.id],
        )?;
        Ok(())
    }

    pub fn delete_channel(&self, id: &ChannelId) -> Result<bool, StoreError> {
        let deleted = self.tx.execute("DELETE FROM channels WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    pub fn channel_ids_for_workspace(&self, id: &WorkspaceId) -> Result<Vec<ChannelId>, StoreError> {
        let mut stmt = self.tx.prepare("SELECT id FROM channels WHERE workspace_id = ?")?;
        let ids = stmt.query_map(params![id], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn insert_message(&self, channel_id: &ChannelId, message: &Message) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO channel_messages
                (id, channel_id, author_id, display_name, avatar, kind, body, created_at, edited_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                message.id,
                channel_id,
                message.author_id,
                message.display_name,
                message.avatar,
                message.kind,
                message.body,
                message.created_at,
                message.edited_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_message(&self, message: &Message) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE channel_messages SET body = ?, edited_at = ? WHERE id = ?",
            params![message.body, message.edited_at, message.id],
        )?;
        Ok(())
    }

    fn write_channel_roster(&self, channel: &Channel) -> Result<(), StoreError> {
        self.replace_list(
            "DELETE FROM channel_members WHERE channel_id = ?",
            "INSERT INTO channel_members (channel_id, user_id, position) VALUES (?, ?, ?)",
            &channel.id,
            channel.roster.members(),
        )?;
        self.replace_list(
            "DELETE FROM channel_admins WHERE channel_id = ?",
            "INSERT INTO channel_admins (channel_id, user_id, position) VALUES (?, ?, ?)",
            &channel.id,
            channel.roster.admins(),
        )
    }

    // ===== Ordered lists =====

    fn load_ordered<K, V>(&self, sql: &str, owner: &K) -> Result<OrderedSet<V>, StoreError>
    where
        K: rusqlite::ToSql,
        V: rusqlite::types::FromSql + std::hash::Hash + Eq,
    {
        let mut stmt = self.tx.prepare_cached(sql)?;
        let values = stmt.query_map(params![owner], |row| row.get::<_, V>(0))?;
        let mut set = OrderedSet::new();
        for value in values {
            set.insert(value?);
        }
        Ok(set)
    }

    fn replace_list<K, V>(
        &self,
        delete_sql: &str,
        insert_sql: &str,
        owner: &K,
        values: &OrderedSet<V>,
    ) -> Result<(), StoreError>
    where
        K: rusqlite::ToSql,
        V: rusqlite::ToSql + std::hash::Hash + Eq,
    {
        self.tx.execute(delete_sql, params![owner])?;
        let mut insert = self.tx.prepare_cached(insert_sql)?;
        for (position, value) in values.iter().enumerate() {
            insert.execute(params![owner, value, position as i64])?;
        }
        Ok(())
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: SecretString::new(row.get(3)?),
        avatar: row.get(4)?,
        workspaces: OrderedSet::new(),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get::<_, MessageId>(0)?,
        author_id: row.get(1)?,
        display_name: row.get(2)?,
        avatar: row.get(3)?,
        kind: row.get(4)?,
        body: row.get(5)?,
        created_at: row.get(6)?,
        edited_at: row.get(7)?,
    })
}
