//! Runtime options for the SQLite context and the unit of work.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use crate::context::IsolationLevel;
use crate::repo::{LocatorMode, RepositoryLocator};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
#[error("invalid workunit configuration: {0}")]
pub struct ConfigError(#[from] serde_json::Error);

/// Connection bootstrap options for `SqliteContext`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteOptions {
    /// Enables `PRAGMA foreign_keys` on every opened connection.
    pub foreign_keys: bool,
    /// Busy timeout used while no command timeout is set.
    pub busy_timeout_ms: u64,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            foreign_keys: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl SqliteOptions {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Coordinator options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnitOfWorkOptions {
    /// Forwarded to the context as its command timeout.
    pub command_timeout_ms: Option<u64>,
    /// Isolation used by `UnitOfWork::begin`.
    pub default_isolation: IsolationLevel,
    /// Mode of the locator a builder creates when none is supplied.
    pub locator_mode: LocatorMode,
}

impl UnitOfWorkOptions {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }

    /// Creates an empty locator in the configured mode.
    pub fn locator(&self) -> RepositoryLocator {
        RepositoryLocator::new(self.locator_mode)
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkunitConfig {
    pub sqlite: SqliteOptions,
    pub unit_of_work: UnitOfWorkOptions,
}

impl WorkunitConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{SqliteOptions, WorkunitConfig};
    use crate::context::IsolationLevel;
    use crate::repo::LocatorMode;
    use std::time::Duration;

    #[test]
    fn empty_document_uses_defaults() {
        let config = WorkunitConfig::from_json_str("{}").unwrap();
        assert_eq!(config, WorkunitConfig::default());
        assert!(config.sqlite.foreign_keys);
        assert_eq!(config.sqlite.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.unit_of_work.command_timeout(), None);
    }

    #[test]
    fn partial_document_overrides_selected_fields() {
        let config = WorkunitConfig::from_json_str(
            r#"{
                "sqlite": { "busy_timeout_ms": 250 },
                "unit_of_work": {
                    "command_timeout_ms": 1500,
                    "default_isolation": "serializable",
                    "locator_mode": "required"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.sqlite,
            SqliteOptions {
                foreign_keys: true,
                busy_timeout_ms: 250
            }
        );
        assert_eq!(
            config.unit_of_work.command_timeout(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(
            config.unit_of_work.default_isolation,
            IsolationLevel::Serializable
        );
        assert_eq!(config.unit_of_work.locator().mode(), LocatorMode::Required);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = WorkunitConfig::from_json_str(r#"{ "sqlite": { "pool_size": 4 } }"#).unwrap_err();
        assert!(err.to_string().contains("pool_size"));
    }
}
