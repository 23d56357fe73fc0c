//! Per-unit repository cache.
//!
//! # Invariants
//! - At most one repository per `EntityTypeKey`.
//! - A handle stored under `EntityTypeKey::of::<T>()` is always an
//!   `Rc<dyn EntityRepository<T>>`; a failed downcast is reported, never
//!   papered over with a fresh instance.

use super::EntityRepository;
use crate::model::{Entity, EntityTypeKey};
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

/// Type-erased map from entity type to its repository handle.
#[derive(Default)]
pub struct RepositoryCache {
    handles: HashMap<EntityTypeKey, Box<dyn Any>>,
}

/// Returned when a cached handle does not have the expected type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleTypeMismatch(pub EntityTypeKey);

impl RepositoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns the cached repository for `T`, if any.
    pub fn get<T: Entity>(&self) -> Result<Option<Rc<dyn EntityRepository<T>>>, HandleTypeMismatch> {
        let key = EntityTypeKey::of::<T>();
        match self.handles.get(&key) {
            None => Ok(None),
            Some(handle) => handle
                .downcast_ref::<Rc<dyn EntityRepository<T>>>()
                .map(|repository| Some(Rc::clone(repository)))
                .ok_or(HandleTypeMismatch(key)),
        }
    }

    /// Stores `repository` for `T`, replacing any previous handle.
    pub fn insert<T: Entity>(&mut self, repository: Rc<dyn EntityRepository<T>>) {
        self.handles
            .insert(EntityTypeKey::of::<T>(), Box::new(repository));
    }
}
