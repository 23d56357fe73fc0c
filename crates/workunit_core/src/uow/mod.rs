//! Unit-of-work coordinator.
//!
//! # Responsibility
//! - Hand out one repository per entity type over a shared context.
//! - Own the single open transaction of a logical flow.
//! - Forward raw statements and change flushing to the context.
//!
//! # Invariants
//! - At most one transaction is open per coordinator.
//! - The coordinator, its cache and its transaction handle are `!Send`.
//! - Cancellation always surfaces as `UnitOfWorkError::Cancelled`.

mod transaction;
mod unit_of_work;

pub use unit_of_work::{UnitOfWork, UnitOfWorkBuilder, WeakUnitOfWork};

use crate::context::{ContextError, IsolationLevel};
use crate::params::BindError;
use crate::repo::RepoError;
use thiserror::Error;

pub type UowResult<T> = Result<T, UnitOfWorkError>;

/// Why a repository could not be produced.
#[derive(Debug, Error)]
pub enum ConstructionFailure {
    #[error("entity mapping does not match the store: {0}")]
    Schema(#[source] RepoError),
    #[error("the locator is required and has no registration")]
    MissingRegistration,
    #[error("the cached repository handle has an unexpected type")]
    HandleTypeMismatch,
}

/// Coordinator errors.
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    #[error("cannot construct repository for `{entity}`: {reason}")]
    Construction {
        entity: &'static str,
        #[source]
        reason: ConstructionFailure,
    },
    #[error("no transaction is active for {operation}")]
    NoActiveTransaction { operation: &'static str },
    #[error("a `{isolation}` transaction is already active")]
    TransactionAlreadyActive { isolation: IsolationLevel },
    #[error(transparent)]
    Context(ContextError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("operation cancelled")]
    Cancelled,
}

impl UnitOfWorkError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ContextError> for UnitOfWorkError {
    fn from(value: ContextError) -> Self {
        match value {
            ContextError::Cancelled => Self::Cancelled,
            other => Self::Context(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UnitOfWorkError;
    use crate::context::ContextError;

    #[test]
    fn context_cancellation_maps_to_dedicated_variant() {
        assert!(UnitOfWorkError::from(ContextError::Cancelled).is_cancelled());
        assert!(matches!(
            UnitOfWorkError::from(ContextError::ConnectionClosed),
            UnitOfWorkError::Context(ContextError::ConnectionClosed)
        ));
    }
}
