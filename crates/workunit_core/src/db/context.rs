//! SQLite-backed `DataContext`.
//!
//! # Responsibility
//! - Own one connection plus the staged change set of a unit of work.
//! - Execute raw statements and flush staged changes atomically.
//!
//! # Invariants
//! - Operations other than transaction completion open the connection on
//!   demand.
//! - `save_changes` runs inside a savepoint: either every staged change is
//!   applied or none is, and a failed flush keeps the staged set intact.
//! - Cancellation is checked before submission and between changes/rows.

use super::migrations::Migration;
use super::open::{open_connection, DbTarget};
use super::statement::{apply_change, prepare_bound, stream_rows};
use super::transaction::SqliteTransaction;
use crate::config::SqliteOptions;
use crate::context::{
    Command, ConnectionState, ContextError, ContextResult, DataContext, IsolationLevel,
    PendingChange, RowHandler,
};
use async_trait::async_trait;
use log::{debug, error, info};
use rusqlite::Connection;
use std::cell::{Cell, Ref, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const SAVE_CHANGES_SAVEPOINT: &str = "workunit_save_changes";

/// Connection state shared between a context and its open transaction.
pub(crate) struct SqliteShared {
    target: DbTarget,
    options: SqliteOptions,
    /// `None` for attached databases whose schema is managed elsewhere.
    migrations: Option<Vec<Migration>>,
    connection: RefCell<Option<Connection>>,
    pending: RefCell<Vec<PendingChange>>,
    command_timeout: Cell<Option<Duration>>,
}

impl SqliteShared {
    /// Borrows the open connection without opening it.
    pub(crate) fn connection(&self) -> ContextResult<Ref<'_, Connection>> {
        let guard = self
            .connection
            .try_borrow()
            .map_err(|_| ContextError::ConnectionBusy)?;
        Ref::filter_map(guard, Option::as_ref).map_err(|_| ContextError::ConnectionClosed)
    }

    fn effective_timeout(&self) -> Duration {
        self.command_timeout
            .get()
            .unwrap_or_else(|| self.options.busy_timeout())
    }
}

/// SQLite database context.
///
/// One context serves one unit of work; it is `!Send` by construction.
pub struct SqliteContext {
    shared: Rc<SqliteShared>,
}

impl SqliteContext {
    /// Opens a file database and applies `migrations`.
    pub fn open_file(
        path: impl AsRef<Path>,
        migrations: &[Migration],
        options: SqliteOptions,
    ) -> ContextResult<Self> {
        let target = DbTarget::File(path.as_ref().to_path_buf());
        let context = Self::closed(target, migrations, options);
        context.open()?;
        Ok(context)
    }

    /// Opens an existing file database without checking or migrating its
    /// schema.
    pub fn attach_file(path: impl AsRef<Path>, options: SqliteOptions) -> ContextResult<Self> {
        let target = DbTarget::File(path.as_ref().to_path_buf());
        let context = Self {
            shared: Self::new_shared(target, None, options),
        };
        context.open()?;
        Ok(context)
    }

    /// Opens a private in-memory database and applies `migrations`.
    pub fn open_in_memory(
        migrations: &[Migration],
        options: SqliteOptions,
    ) -> ContextResult<Self> {
        let context = Self::closed(DbTarget::Memory, migrations, options);
        context.open()?;
        Ok(context)
    }

    /// Creates a context whose connection opens on first use.
    pub fn closed(target: DbTarget, migrations: &[Migration], options: SqliteOptions) -> Self {
        Self {
            shared: Self::new_shared(target, Some(migrations.to_vec()), options),
        }
    }

    fn new_shared(
        target: DbTarget,
        migrations: Option<Vec<Migration>>,
        options: SqliteOptions,
    ) -> Rc<SqliteShared> {
        Rc::new(SqliteShared {
            target,
            options,
            migrations,
            connection: RefCell::new(None),
            pending: RefCell::new(Vec::new()),
            command_timeout: Cell::new(None),
        })
    }

    pub fn target(&self) -> &DbTarget {
        &self.shared.target
    }

    /// Discards every staged change without touching the database.
    pub fn discard_changes(&self) -> usize {
        self.shared.pending.take().len()
    }

    /// Returns true while a transaction is open on the connection.
    pub fn in_transaction(&self) -> bool {
        self.shared
            .connection()
            .map(|conn| !conn.is_autocommit())
            .unwrap_or(false)
    }

    fn ensure_open(&self) -> ContextResult<Ref<'_, Connection>> {
        self.open()?;
        self.shared.connection()
    }

    fn flush(&self, cancel: Option<&CancellationToken>) -> ContextResult<usize> {
        let changes = self.shared.pending.take();
        if changes.is_empty() {
            return Ok(0);
        }

        let started_at = Instant::now();
        let result = self.flush_changes(&changes, cancel);
        match &result {
            Ok(affected) => info!(
                "event=save_changes module=db status=ok changes={} affected={} duration_ms={}",
                changes.len(),
                affected,
                started_at.elapsed().as_millis()
            ),
            Err(err) => {
                error!(
                    "event=save_changes module=db status=error changes={} duration_ms={} error={}",
                    changes.len(),
                    started_at.elapsed().as_millis(),
                    err
                );
                let mut pending = self.shared.pending.borrow_mut();
                let staged_since = std::mem::replace(&mut *pending, changes);
                pending.extend(staged_since);
            }
        }
        result
    }

    fn flush_changes(
        &self,
        changes: &[PendingChange],
        cancel: Option<&CancellationToken>,
    ) -> ContextResult<usize> {
        let conn = self.ensure_open()?;
        conn.execute_batch(&format!("SAVEPOINT {SAVE_CHANGES_SAVEPOINT};"))?;

        let applied = changes.iter().try_fold(0, |affected, change| {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(ContextError::Cancelled);
            }
            Ok(affected + apply_change(&conn, change)?)
        });

        match applied {
            Ok(affected) => {
                conn.execute_batch(&format!("RELEASE {SAVE_CHANGES_SAVEPOINT};"))?;
                Ok(affected)
            }
            Err(err) => {
                conn.execute_batch(&format!(
                    "ROLLBACK TO {SAVE_CHANGES_SAVEPOINT}; RELEASE {SAVE_CHANGES_SAVEPOINT};"
                ))?;
                Err(err)
            }
        }
    }
}

/// Yields once so an async caller is suspended at the submission point.
async fn submit(cancel: &CancellationToken) -> ContextResult<()> {
    if cancel.is_cancelled() {
        return Err(ContextError::Cancelled);
    }
    tokio::task::yield_now().await;
    if cancel.is_cancelled() {
        return Err(ContextError::Cancelled);
    }
    Ok(())
}

#[async_trait(?Send)]
impl DataContext for SqliteContext {
    type Transaction = SqliteTransaction;

    fn connection_state(&self) -> ConnectionState {
        match self.shared.connection.try_borrow() {
            Ok(guard) if guard.is_none() => ConnectionState::Closed,
            _ => ConnectionState::Open,
        }
    }

    fn open(&self) -> ContextResult<()> {
        if self.connection_state() == ConnectionState::Open {
            return Ok(());
        }

        let conn = open_connection(
            &self.shared.target,
            &self.shared.options,
            self.shared.migrations.as_deref(),
        )?;
        conn.busy_timeout(self.shared.effective_timeout())?;

        let mut slot = self
            .shared
            .connection
            .try_borrow_mut()
            .map_err(|_| ContextError::ConnectionBusy)?;
        *slot = Some(conn);
        Ok(())
    }

    fn close(&self) -> ContextResult<()> {
        let conn = self
            .shared
            .connection
            .try_borrow_mut()
            .map_err(|_| ContextError::ConnectionBusy)?
            .take();

        if let Some(conn) = conn {
            conn.close().map_err(|(_, err)| ContextError::from(err))?;
            info!(
                "event=db_close module=db status=ok mode={}",
                self.shared.target.mode()
            );
        }
        Ok(())
    }

    fn begin_transaction(&self, isolation: IsolationLevel) -> ContextResult<SqliteTransaction> {
        let begin = match isolation {
            IsolationLevel::Chaos => {
                return Err(ContextError::UnsupportedIsolationLevel(isolation));
            }
            IsolationLevel::Serializable => "BEGIN IMMEDIATE;",
            _ => "BEGIN DEFERRED;",
        };

        let conn = self.ensure_open()?;
        if isolation == IsolationLevel::ReadUncommitted {
            conn.execute_batch("PRAGMA read_uncommitted = 1;")?;
        }
        if let Err(err) = conn.execute_batch(begin) {
            if isolation == IsolationLevel::ReadUncommitted {
                conn.execute_batch("PRAGMA read_uncommitted = 0;")?;
            }
            return Err(err.into());
        }

        Ok(SqliteTransaction::new(Rc::clone(&self.shared), isolation))
    }

    fn track(&self, change: PendingChange) {
        debug!(
            "event=track_change module=db status=ok kind={} table={}",
            change.kind, change.table
        );
        self.shared.pending.borrow_mut().push(change);
    }

    fn pending_changes(&self) -> usize {
        self.shared.pending.borrow().len()
    }

    fn save_changes(&self) -> ContextResult<usize> {
        self.flush(None)
    }

    async fn save_changes_async(&self, cancel: &CancellationToken) -> ContextResult<usize> {
        submit(cancel).await?;
        self.flush(Some(cancel))
    }

    fn execute_non_query(&self, command: &Command) -> ContextResult<usize> {
        let conn = self.ensure_open()?;
        let mut stmt = prepare_bound(&conn, command)?;
        Ok(stmt.raw_execute()?)
    }

    async fn execute_non_query_async(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> ContextResult<usize> {
        submit(cancel).await?;
        self.execute_non_query(command)
    }

    fn execute_reader(
        &self,
        command: &Command,
        on_row: &mut RowHandler<'_>,
    ) -> ContextResult<usize> {
        let conn = self.ensure_open()?;
        stream_rows(&conn, command, None, on_row)
    }

    async fn execute_reader_async(
        &self,
        command: &Command,
        cancel: &CancellationToken,
        on_row: &mut RowHandler<'_>,
    ) -> ContextResult<usize> {
        submit(cancel).await?;
        let conn = self.ensure_open()?;
        stream_rows(&conn, command, Some(cancel), on_row)
    }

    fn command_timeout(&self) -> Option<Duration> {
        self.shared.command_timeout.get()
    }

    fn set_command_timeout(&self, timeout: Option<Duration>) -> ContextResult<()> {
        self.shared.command_timeout.set(timeout);
        if let Ok(conn) = self.shared.connection() {
            conn.busy_timeout(self.shared.effective_timeout())?;
        }
        Ok(())
    }

    fn table_columns(&self, table: &str) -> ContextResult<Vec<String>> {
        let conn = self.ensure_open()?;
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1);")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}
