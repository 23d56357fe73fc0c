//! Entity-side contracts consumed by repositories and the coordinator.
//!
//! # Responsibility
//! - Define what makes a type persistable through a generic repository.
//! - Provide the stable per-type key used to cache repositories.
//!
//! # Invariants
//! - `EntityTypeKey` equality is type identity, never name equality.
//! - `Entity::values()` is aligned with `Entity::columns()`.

mod entity;
mod key;

pub use entity::{Entity, Trackable, TrackingState};
pub use key::EntityTypeKey;
