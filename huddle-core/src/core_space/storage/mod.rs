//! Storage layer for users, workspaces and channels
//!
//! Provides SQLite persistence with per-operation transactions.

pub mod error;
pub mod migrations;
pub mod sql_store;

pub use error::StoreError;
pub use migrations::{migrate, CURRENT_SCHEMA_VERSION};
pub use sql_store::{SqlStore, StoreTx};
