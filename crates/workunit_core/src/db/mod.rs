//! SQLite driver collaborator.
//!
//! # Responsibility
//! - Implement `DataContext` on top of `rusqlite`.
//! - Open and configure connections, apply host-supplied migrations.
//! - Translate staged changes into plain single-table SQL.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Entity data is never read or written before migrations succeed.

mod context;
pub mod migrations;
mod open;
mod statement;
mod transaction;

pub use context::SqliteContext;
pub use migrations::Migration;
pub use open::DbTarget;
pub use transaction::SqliteTransaction;

pub(crate) use statement::quote;
