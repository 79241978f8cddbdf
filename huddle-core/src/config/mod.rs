//! Configuration management for Huddle
//!
//! Configuration comes from defaults, an optional TOML file and
//! `HUDDLE_<SECTION>_<KEY>` environment overrides, applied in that order.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Database path that selects an in-memory store
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub workspace: WorkspaceConfig,
    pub mail: MailConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,

    /// Base URL used when building invite and reset links
    pub public_base_url: String,

    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// SQLite store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file, or `:memory:`
    pub database_path: PathBuf,

    pub pool_size: u32,

    /// How long a writer waits for the database lock before giving up
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Token secrets, lifetimes and password hashing cost
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub user_secret: SecretString,
    pub reset_secret: SecretString,
    pub invite_secret: SecretString,

    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,

    #[serde(with = "humantime_serde")]
    pub reset_ttl: Duration,

    #[serde(with = "humantime_serde")]
    pub invite_ttl: Duration,

    /// Argon2 memory cost in KiB
    pub hash_memory_kib: u32,

    /// Argon2 iteration count
    pub hash_iterations: u32,
}

/// Defaults applied to new workspaces
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Name of the channel every workspace starts with and every joiner enters
    pub general_channel: String,

    pub general_channel_logo: String,
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// When false, mails are logged instead of sent
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<SecretString>,
    pub from_address: String,

    /// Link to the product page included in mails
    pub product_link: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve a Prometheus scrape endpoint
    pub enabled: bool,

    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 5000)),
            public_base_url: "http://localhost:5000".to_string(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/huddle.db"),
            pool_size: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_secret: SecretString::new(String::new()),
            reset_secret: SecretString::new(String::new()),
            invite_secret: SecretString::new(String::new()),
            session_ttl: Duration::from_secs(100 * 60 * 60),
            reset_ttl: Duration::from_secs(15 * 60),
            invite_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            hash_memory_kib: 19 * 1024,
            hash_iterations: 2,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { general_channel: "general".to_string(), general_channel_logo: "general.png".to_string() }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_address: "Huddle <no-reply@localhost>".to_string(),
            product_link: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false, with_timestamp: true, with_target: true }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, bind_address: SocketAddr::from(([127, 0, 0, 1], 9090)) }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(raw)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

impl Config {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// File contents with environment overrides applied
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        let mut config: Self = toml::from_str(&contents)?;

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HUDDLE_<SECTION>_<KEY>` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| (key.to_string(), v));

        // Server
        if let Some((k, v)) = get("HUDDLE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = parse_value(&k, &v)?;
        }
        if let Some((_, v)) = get("HUDDLE_SERVER_PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }
        if let Some((k, v)) = get("HUDDLE_SERVER_SHUTDOWN_TIMEOUT") {
            self.server.shutdown_timeout = parse_duration(&k, &v)?;
        }

        // Store
        if let Some((_, v)) = get("HUDDLE_STORE_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(v);
        }
        if let Some((k, v)) = get("HUDDLE_STORE_POOL_SIZE") {
            self.store.pool_size = parse_value(&k, &v)?;
        }
        if let Some((k, v)) = get("HUDDLE_STORE_BUSY_TIMEOUT") {
            self.store.busy_timeout = parse_duration(&k, &v)?;
        }

        // Auth
        if let Some((_, v)) = get("HUDDLE_AUTH_USER_SECRET") {
            self.auth.user_secret = SecretString::new(v);
        }
        if let Some((_, v)) = get("HUDDLE_AUTH_RESET_SECRET") {
            self.auth.reset_secret = SecretString::new(v);
        }
        if let Some((_, v)) = get("HUDDLE_AUTH_INVITE_SECRET") {
            self.auth.invite_secret = SecretString::new(v);
        }
        if let Some((k, v)) = get("HUDDLE_AUTH_SESSION_TTL") {
            self.auth.session_ttl = parse_duration(&k, &v)?;
        }
        if let Some((k, v)) = get("HUDDLE_AUTH_RESET_TTL") {
            self.auth.reset_ttl = parse_duration(&k, &v)?;
        }
        if let Some((k, v)) = get("HUDDLE_AUTH_INVITE_TTL") {
            self.auth.invite_ttl = parse_duration(&k, &v)?;
        }

        // Workspace
        if let Some((_, v)) = get("HUDDLE_WORKSPACE_GENERAL_CHANNEL") {
            self.workspace.general_channel = v;
        }

        // Mail
        if let Some((k, v)) = get("HUDDLE_MAIL_ENABLED") {
            self.mail.enabled = parse_value(&k, &v)?;
        }
        if let Some((_, v)) = get("HUDDLE_MAIL_SMTP_HOST") {
            self.mail.smtp_host = v;
        }
        if let Some((k, v)) = get("HUDDLE_MAIL_SMTP_PORT") {
            self.mail.smtp_port = parse_value(&k, &v)?;
        }
        if let Some((_, v)) = get("HUDDLE_MAIL_SMTP_USERNAME") {
            self.mail.smtp_username = Some(v);
        }
        if let Some((_, v)) = get("HUDDLE_MAIL_SMTP_PASSWORD") {
            self.mail.smtp_password = Some(SecretString::new(v));
        }
        if let Some((_, v)) = get("HUDDLE_MAIL_FROM_ADDRESS") {
            self.mail.from_address = v;
        }

        // Logging
        if let Some((_, v)) = get("HUDDLE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some((k, v)) = get("HUDDLE_LOG_JSON") {
            self.logging.json_format = parse_value(&k, &v)?;
        }

        // Metrics
        if let Some((k, v)) = get("HUDDLE_METRICS_ENABLED") {
            self.metrics.enabled = parse_value(&k, &v)?;
        }
        if let Some((k, v)) = get("HUDDLE_METRICS_BIND_ADDRESS") {
            self.metrics.bind_address = parse_value(&k, &v)?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, secret) in [
            ("auth.user_secret", &self.auth.user_secret),
            ("auth.reset_secret", &self.auth.reset_secret),
            ("auth.invite_secret", &self.auth.invite_secret),
        ] {
            if secret.expose_secret().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must be set", name)));
            }
        }

        if self.store.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "store.pool_size must be greater than 0".to_string(),
            ));
        }

        if self.workspace.general_channel.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "workspace.general_channel must not be empty".to_string(),
            ));
        }

        if self.mail.enabled && self.mail.smtp_host.is_empty() {
            return Err(ConfigError::Invalid(
                "mail.smtp_host is required when mail is enabled".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// True when the store should live in memory
    pub fn in_memory_store(&self) -> bool {
        self.store.database_path.as_os_str() == IN_MEMORY_DATABASE
    }
}
