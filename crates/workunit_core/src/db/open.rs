//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas from `SqliteOptions`.
//! - Run schema migrations before a connection is handed out, unless the
//!   caller attaches to a schema it does not manage.
//!
//! # Invariants
//! - Returned managed connections have migrations fully applied.
//! - Returned connections carry the configured busy timeout.

use super::migrations::{apply_migrations, Migration};
use crate::config::SqliteOptions;
use crate::context::ContextResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::Instant;

/// Where a context's connection lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    File(PathBuf),
    /// Private in-memory database; its contents are lost when the
    /// connection closes.
    Memory,
}

impl DbTarget {
    pub(crate) fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens a connection for `target`, applies pragmas, then migrations.
///
/// `None` leaves the schema and its `user_version` untouched.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub(crate) fn open_connection(
    target: &DbTarget,
    options: &SqliteOptions,
    migrations: Option<&[Migration]>,
) -> ContextResult<Connection> {
    let started_at = Instant::now();
    let mode = target.mode();
    info!("event=db_open module=db status=start mode={mode}");

    let opened = match target {
        DbTarget::File(path) => Connection::open(path),
        DbTarget::Memory => Connection::open_in_memory(),
    };
    let mut conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, options, migrations) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(
    conn: &mut Connection,
    options: &SqliteOptions,
    migrations: Option<&[Migration]>,
) -> ContextResult<()> {
    let foreign_keys = if options.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(options.busy_timeout())?;
    if let Some(migrations) = migrations {
        apply_migrations(conn, migrations)?;
    }
    Ok(())
}
