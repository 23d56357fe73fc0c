//! Trackable entity contract.
//!
//! # Responsibility
//! - Describe change-tracking state carried by entity instances.
//! - Describe the table mapping a generic repository needs.
//!
//! # Invariants
//! - `KEY_COLUMN` is one of `columns()`.
//! - Table and column names are plain SQL identifiers; repositories reject
//!   anything else at construction time.

use crate::context::{ContextResult, DataRow, SqlValue};
use serde::{Deserialize, Serialize};

/// Change-tracking state of one entity instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    /// Matches the stored row.
    #[default]
    Unchanged,
    /// Not stored yet.
    Added,
    /// Stored, with local modifications.
    Modified,
    /// Stored, scheduled for removal.
    Deleted,
}

/// Types whose instances carry change-tracking metadata.
pub trait Trackable {
    fn tracking_state(&self) -> TrackingState;
    fn set_tracking_state(&mut self, state: TrackingState);
}

/// A trackable type mapped onto one table.
pub trait Entity: Trackable + Clone + 'static {
    const TABLE: &'static str;
    const KEY_COLUMN: &'static str;

    /// Every persisted column, key included.
    fn columns() -> &'static [&'static str];

    fn key(&self) -> SqlValue;

    /// Column values, in `columns()` order.
    fn values(&self) -> Vec<SqlValue>;

    /// Materializes an instance from a row selected with `columns()`.
    ///
    /// Materialized instances should report `TrackingState::Unchanged`.
    fn from_row(row: &DataRow<'_>) -> ContextResult<Self>;
}
