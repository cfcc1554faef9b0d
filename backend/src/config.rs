//! Store connection settings loaded via OrthoConfig.
//!
//! Values come from `SCHEDULES_DB_*` environment variables, configuration
//! files and command-line flags, in OrthoConfig's usual precedence.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::outbound::persistence::PoolConfig;

/// Connection settings for the schedule store.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "SCHEDULES_DB")]
pub struct PersistenceSettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Upper bound on pooled connections.
    #[ortho_config(default = 10)]
    pub max_connections: u32,
    /// Idle connections kept open.
    pub min_idle: Option<u32>,
    /// Seconds to wait for a pooled connection.
    #[ortho_config(default = 30)]
    pub connection_timeout_secs: u64,
}

/// Settings that cannot produce a pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// No connection string was supplied.
    #[error("no database url configured; set SCHEDULES_DB_DATABASE_URL or pass --database-url")]
    MissingDatabaseUrl,
    /// A pool size of zero was requested.
    #[error("max_connections must be at least 1")]
    ZeroMaxConnections,
}

impl PersistenceSettings {
    /// Checkout timeout as a [`Duration`].
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Build the pool configuration, preferring `database_url_override`.
    ///
    /// # Errors
    ///
    /// [`SettingsError::MissingDatabaseUrl`] when neither the override nor
    /// the settings name a database and [`SettingsError::ZeroMaxConnections`]
    /// when the pool would be empty.
    pub fn pool_config(
        &self,
        database_url_override: Option<&str>,
    ) -> Result<PoolConfig, SettingsError> {
        let url = database_url_override
            .or(self.database_url.as_deref())
            .ok_or(SettingsError::MissingDatabaseUrl)?;
        let max_size = self.max_connections;
        if max_size == 0 {
            return Err(SettingsError::ZeroMaxConnections);
        }
        Ok(PoolConfig::new(url)
            .with_max_size(max_size)
            .with_min_idle(self.min_idle)
            .with_connection_timeout(self.connection_timeout()))
    }
}
