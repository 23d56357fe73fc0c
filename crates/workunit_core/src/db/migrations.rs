//! Schema migration registry and executor.
//!
//! # Responsibility
//! - Apply host-supplied schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must increase strictly; unordered lists are rejected
//!   before any SQL runs.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A database newer than the latest known migration is never touched.

use crate::context::{ContextError, ContextResult};
use log::info;
use rusqlite::Connection;

/// One schema step, usually embedded with `include_str!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub sql: &'static str,
}

impl Migration {
    pub const fn new(version: u32, sql: &'static str) -> Self {
        Self { version, sql }
    }
}

/// Returns the latest version in `migrations`, or 0 when empty.
pub fn latest_version(migrations: &[Migration]) -> u32 {
    migrations.last().map_or(0, |migration| migration.version)
}

/// Applies every migration newer than the database's `user_version`.
pub fn apply_migrations(conn: &mut Connection, migrations: &[Migration]) -> ContextResult<()> {
    ensure_ordered(migrations)?;

    let current_version = current_user_version(conn)?;
    let latest = latest_version(migrations);

    if current_version > latest {
        return Err(ContextError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={}",
        current_version, latest
    );
    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> ContextResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn ensure_ordered(migrations: &[Migration]) -> ContextResult<()> {
    for pair in migrations.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(ContextError::MigrationOrder {
                previous: pair[0].version,
                next: pair[1].version,
            });
        }
    }
    Ok(())
}
