//! Configuration loaded from environment variables.

use std::env;

use database::{Database, Role};

/// Admin command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite database URL.
    pub database_url: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// Role the commands run as.
    pub role: Role,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `SABBAR_DATABASE_URL` | SQLite database URL | `sqlite:sabbar.db?mode=rwc` |
    /// | `SABBAR_DB_POOL_SIZE` | Connection pool size | `20` |
    /// | `SABBAR_ROLE` | Caller role checked against access policies | `service_role` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("SABBAR_DATABASE_URL")
            .unwrap_or_else(|| "sqlite:sabbar.db?mode=rwc".to_string());

        let pool_size = match lookup("SABBAR_DB_POOL_SIZE") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::InvalidPoolSize(raw)),
            },
            None => Database::DEFAULT_POOL_SIZE,
        };

        let role = match lookup("SABBAR_ROLE") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidRole(raw))?,
            None => Role::ServiceRole,
        };

        Ok(Self {
            database_url,
            pool_size,
            role,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SABBAR_DB_POOL_SIZE must be a positive integer, got {0:?}")]
    InvalidPoolSize(String),

    #[error("SABBAR_ROLE must be one of public, authenticated, service_role, got {0:?}")]
    InvalidRole(String),
}
