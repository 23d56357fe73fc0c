//! Repository contracts, the generic repository and its per-unit cache.
//!
//! # Responsibility
//! - Define the typed CRUD surface application code talks to.
//! - Cache one repository per entity type for a unit of work.
//! - Let a host-supplied locator substitute repository implementations.
//!
//! # Invariants
//! - Writes are staged in the shared context; nothing reaches the database
//!   before `save_changes`.
//! - Repositories never own a connection.

mod cache;
mod locator;
mod repository;

pub use cache::{HandleTypeMismatch, RepositoryCache};
pub use locator::{LocatorError, LocatorMode, RepositoryLocator};
pub use repository::Repository;

use crate::context::{ContextError, SqlValue};
use crate::model::{Entity, TrackingState};
use crate::params::Parameters;
use crate::uow::UnitOfWorkError;
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository-level errors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("`{0}` is not a valid SQL identifier")]
    InvalidIdentifier(&'static str),
    #[error("required table is missing: {0}")]
    MissingRequiredTable(&'static str),
    #[error("required column is missing: {table}.{column}")]
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    #[error("key column `{column}` is not one of the declared columns of `{table}`")]
    UndeclaredKeyColumn {
        table: &'static str,
        column: &'static str,
    },
    #[error("`{table}` declares {columns} columns but the entity produced {values} values")]
    ValueCountMismatch {
        table: &'static str,
        columns: usize,
        values: usize,
    },
    #[error("`{0}` has no columns besides its key to update")]
    NothingToUpdate(&'static str),
    #[error("the unit of work behind the `{0}` repository has been dropped")]
    Detached(&'static str),
    #[error(transparent)]
    UnitOfWork(Box<UnitOfWorkError>),
}

impl From<UnitOfWorkError> for RepoError {
    fn from(value: UnitOfWorkError) -> Self {
        Self::UnitOfWork(Box::new(value))
    }
}

/// Typed CRUD surface over one entity type.
pub trait EntityRepository<T: Entity> {
    /// Loads one entity by key.
    fn find(&self, key: SqlValue) -> RepoResult<Option<T>>;

    /// Loads every stored entity.
    fn all(&self) -> RepoResult<Vec<T>>;

    /// Loads entities matching a SQL `WHERE` fragment.
    fn query(&self, filter: &str, parameters: Parameters) -> RepoResult<Vec<T>>;

    /// Stages an insert.
    fn insert(&self, entity: &T) -> RepoResult<()>;

    /// Stages an update by key.
    fn update(&self, entity: &T) -> RepoResult<()>;

    /// Stages a delete by key.
    fn delete(&self, entity: &T) -> RepoResult<()>;

    /// Stages whatever the entity's tracking state asks for.
    ///
    /// Returns `false` for `Unchanged` entities, which stage nothing.
    fn apply_changes(&self, entity: &T) -> RepoResult<bool> {
        match entity.tracking_state() {
            TrackingState::Unchanged => return Ok(false),
            TrackingState::Added => self.insert(entity)?,
            TrackingState::Modified => self.update(entity)?,
            TrackingState::Deleted => self.delete(entity)?,
        }
        Ok(true)
    }
}
