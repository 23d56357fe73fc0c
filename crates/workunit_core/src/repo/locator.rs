//! Injected repository locator.
//!
//! # Responsibility
//! - Let the host substitute repository implementations (custom or mock)
//!   for selected entity types.
//! - Decide whether types without a registration fall back to the
//!   unit of work's own construction.
//!
//! # Invariants
//! - One registration per entity type.
//! - The locator is passed to a unit of work explicitly; there is no
//!   process-wide instance.

use super::EntityRepository;
use crate::model::{Entity, EntityTypeKey};
use serde::Deserialize;
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

type Factory<T> = Box<dyn Fn() -> Rc<dyn EntityRepository<T>>>;

/// What a unit of work does when the locator cannot resolve a type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorMode {
    /// Build and cache the default repository.
    #[default]
    Optional,
    /// Fail with a construction error.
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("a repository is already registered for {0}")]
    DuplicateRegistration(&'static str),
}

/// Registry of repository factories keyed by entity type.
#[derive(Default)]
pub struct RepositoryLocator {
    mode: LocatorMode,
    factories: HashMap<EntityTypeKey, Box<dyn Any>>,
}

impl RepositoryLocator {
    pub fn new(mode: LocatorMode) -> Self {
        Self {
            mode,
            factories: HashMap::new(),
        }
    }

    pub fn mode(&self) -> LocatorMode {
        self.mode
    }

    /// True once at least one registration exists.
    pub fn is_configured(&self) -> bool {
        !self.factories.is_empty()
    }

    pub fn is_registered<T: Entity>(&self) -> bool {
        self.factories.contains_key(&EntityTypeKey::of::<T>())
    }

    /// Registers a factory invoked on every resolution of `T`.
    pub fn register<T, F>(&mut self, factory: F) -> Result<(), LocatorError>
    where
        T: Entity,
        F: Fn() -> Rc<dyn EntityRepository<T>> + 'static,
    {
        let key = EntityTypeKey::of::<T>();
        if self.factories.contains_key(&key) {
            return Err(LocatorError::DuplicateRegistration(key.type_name()));
        }
        let factory: Factory<T> = Box::new(factory);
        self.factories.insert(key, Box::new(factory));
        Ok(())
    }

    /// Registers one shared instance for `T`.
    pub fn register_instance<T: Entity>(
        &mut self,
        repository: Rc<dyn EntityRepository<T>>,
    ) -> Result<(), LocatorError> {
        self.register::<T, _>(move || Rc::clone(&repository))
    }

    /// Resolves `T`, or `None` without a registration.
    pub fn resolve<T: Entity>(&self) -> Option<Rc<dyn EntityRepository<T>>> {
        self.factories
            .get(&EntityTypeKey::of::<T>())
            .and_then(|factory| factory.downcast_ref::<Factory<T>>())
            .map(|factory| factory())
    }
}
