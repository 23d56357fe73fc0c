//! Driver collaborator contracts.
//!
//! # Responsibility
//! - Define what the coordinator needs from a database driver: connection
//!   state, transactions, change flushing and raw statement execution.
//! - Own the value types shared by drivers, repositories and the binder.
//!
//! # Invariants
//! - A context serves exactly one logical flow; implementations are free to
//!   use `Rc`/`RefCell` and are not required to be `Send`.
//! - Cancellation is reported as `ContextError::Cancelled` and never folded
//!   into another variant.
//!
//! # See also
//! - `crate::db` for the SQLite implementation.

mod change;
mod command;
mod row;

pub use change::{ChangeKind, PendingChange};
pub use command::{Command, ParameterSet, StatementParameter};
pub use row::DataRow;
pub use rusqlite::types::Value as SqlValue;

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub type ContextResult<T> = Result<T, ContextError>;

/// Row visitor used by streaming reads.
///
/// Returning an error stops the iteration and releases the cursor.
pub type RowHandler<'f> = dyn for<'r> FnMut(&DataRow<'r>) -> ContextResult<()> + 'f;

/// Errors raised by a driver collaborator.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("parameter mismatch: {0}")]
    ParameterMismatch(String),
    #[error("isolation level `{0}` is not supported by this driver")]
    UnsupportedIsolationLevel(IsolationLevel),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    #[error("migration versions must increase strictly: {previous} is followed by {next}")]
    MigrationOrder { previous: u32, next: u32 },
    #[error("concurrency conflict: {kind} on `{table}` matched no row for key {key}")]
    ConcurrencyConflict {
        kind: ChangeKind,
        table: &'static str,
        key: String,
    },
    #[error("invalid value in column `{column}`: {reason}")]
    InvalidColumn { column: String, reason: String },
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("connection is in use by an active statement")]
    ConnectionBusy,
    #[error("operation cancelled")]
    Cancelled,
}

impl ContextError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Connection lifecycle as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Requested visibility of concurrent uncommitted changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Driver default.
    #[default]
    Unspecified,
    Chaos,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

impl IsolationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Chaos => "chaos",
            Self::ReadUncommitted => "read_uncommitted",
            Self::ReadCommitted => "read_committed",
            Self::RepeatableRead => "repeatable_read",
            Self::Serializable => "serializable",
            Self::Snapshot => "snapshot",
        }
    }
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open transaction bound to one connection.
///
/// `commit` and `rollback` take `self` by value: a handle is finished
/// exactly once and cannot be reused afterwards.
pub trait TransactionHandle {
    fn isolation_level(&self) -> IsolationLevel;
    fn commit(self) -> ContextResult<()>;
    fn rollback(self) -> ContextResult<()>;
}

/// Database context consumed by the unit of work.
///
/// Implementations own the connection, the pending change set and the
/// statement machinery. Every `*_async` operation checks `cancel` before it
/// submits work and while it streams results.
#[async_trait(?Send)]
pub trait DataContext: 'static {
    type Transaction: TransactionHandle;

    fn connection_state(&self) -> ConnectionState;

    /// Opens the connection. Opening an open connection is a no-op.
    fn open(&self) -> ContextResult<()>;

    /// Closes the connection. Closing a closed connection is a no-op.
    fn close(&self) -> ContextResult<()>;

    fn begin_transaction(&self, isolation: IsolationLevel) -> ContextResult<Self::Transaction>;

    /// Stages one change for the next `save_changes`.
    fn track(&self, change: PendingChange);

    fn pending_changes(&self) -> usize;

    /// Flushes every staged change as one atomic operation and returns the
    /// number of affected rows.
    fn save_changes(&self) -> ContextResult<usize>;

    async fn save_changes_async(&self, cancel: &CancellationToken) -> ContextResult<usize>;

    fn execute_non_query(&self, command: &Command) -> ContextResult<usize>;

    async fn execute_non_query_async(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> ContextResult<usize>;

    /// Streams the rows produced by `command` into `on_row` and returns the
    /// number of rows visited.
    fn execute_reader(&self, command: &Command, on_row: &mut RowHandler<'_>)
        -> ContextResult<usize>;

    async fn execute_reader_async(
        &self,
        command: &Command,
        cancel: &CancellationToken,
        on_row: &mut RowHandler<'_>,
    ) -> ContextResult<usize>;

    fn command_timeout(&self) -> Option<Duration>;

    fn set_command_timeout(&self, timeout: Option<Duration>) -> ContextResult<()>;

    /// Returns the column names of `table`, or an empty list when the table
    /// does not exist.
    fn table_columns(&self, table: &str) -> ContextResult<Vec<String>>;
}
