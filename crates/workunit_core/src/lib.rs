//! Unit-of-work and repository coordination over SQLite.
//!
//! A `UnitOfWork` owns one `DataContext`, hands out one repository per
//! entity type, tracks a single transaction and forwards raw statements.

pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod params;
pub mod repo;
pub mod uow;

pub use config::{ConfigError, SqliteOptions, UnitOfWorkOptions, WorkunitConfig};
pub use context::{
    Command, ConnectionState, ContextError, ContextResult, DataContext, DataRow, IsolationLevel,
    SqlValue, TransactionHandle,
};
pub use db::{DbTarget, Migration, SqliteContext};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::{Entity, EntityTypeKey, Trackable, TrackingState};
pub use params::{bind_parameters, BindError, ParameterRecord, ParameterValue, Parameters};
pub use repo::{
    EntityRepository, LocatorMode, RepoError, RepoResult, Repository, RepositoryLocator,
};
pub use uow::{ConstructionFailure, UnitOfWork, UnitOfWorkError, UowResult, WeakUnitOfWork};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
