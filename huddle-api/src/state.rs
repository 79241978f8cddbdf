//! Shared application state

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use huddle_core::config::Config;
use huddle_core::core_identity::{IdentityError, IdentityService, TokenSigner};
use huddle_core::core_mail::{InvitationSender, MailDispatcher, MailError, SmtpMailer};
use huddle_core::core_space::{InviteTokenService, MembershipCoordinator, SqlStore, StoreError};
use huddle_core::health::HealthChecker;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to set up identity service: {0}")]
    Identity(#[from] IdentityError),

    #[error("Failed to set up mail: {0}")]
    Mail(#[from] MailError),

    #[error("Failed to create data directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Services shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub spaces: Arc<MembershipCoordinator>,
    pub invitations: InvitationSender,
    pub health: HealthChecker,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let store = if config.in_memory_store() {
            SqlStore::memory()?
        } else {
            if let Some(dir) = config.store.database_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            SqlStore::open(
                &config.store.database_path,
                config.store.pool_size,
                config.store.busy_timeout,
            )?
        };
        info!(path = %config.store.database_path.display(), "store opened");

        let mail = if config.mail.enabled {
            MailDispatcher::new(Arc::new(SmtpMailer::from_config(&config.mail)?))
        } else {
            MailDispatcher::disabled()
        };

        Self::new(store, config, mail)
    }

    /// Build with an explicit store and mail dispatcher
    pub fn new(store: SqlStore, config: &Config, mail: MailDispatcher) -> Result<Self, StartupError> {
        let invites = InviteTokenService::new(
            TokenSigner::new(&config.auth.invite_secret),
            config.auth.invite_ttl,
        );
        let spaces = MembershipCoordinator::new(store.clone(), invites, config.workspace.clone());
        let identity =
            IdentityService::new(store.clone(), &config.auth, &config.server.public_base_url, mail.clone())?;
        let invitations = InvitationSender::new(
            mail,
            config.server.public_base_url.clone(),
            config.mail.product_link.clone(),
        );

        Ok(AppState {
            identity: Arc::new(identity),
            spaces: Arc::new(spaces),
            invitations,
            health: HealthChecker::new(store, env!("CARGO_PKG_VERSION")),
        })
    }
}
