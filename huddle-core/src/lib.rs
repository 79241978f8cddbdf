//! Huddle core: team workspaces, channels, membership and accounts

pub mod config;
pub mod core_identity;
pub mod core_mail;
pub mod core_space;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod shutdown;

pub use config::Config;
pub use logging::{init_logging, LogLevel};
