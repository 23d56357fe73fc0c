//! SQLite transaction handle.
//!
//! # Invariants
//! - A handle is finished at most once; an unfinished handle rolls back
//!   when dropped.
//! - Finishing never reopens a closed connection: closing the connection
//!   has already rolled the transaction back.
//! - `read_uncommitted` is restored when a `ReadUncommitted` handle ends.

use super::context::SqliteShared;
use crate::context::{ContextResult, IsolationLevel, TransactionHandle};
use log::{info, warn};
use std::rc::Rc;

pub struct SqliteTransaction {
    shared: Rc<SqliteShared>,
    isolation: IsolationLevel,
    finished: bool,
}

impl SqliteTransaction {
    pub(crate) fn new(shared: Rc<SqliteShared>, isolation: IsolationLevel) -> Self {
        info!(
            "event=tx_begin module=db status=ok isolation={}",
            isolation
        );
        Self {
            shared,
            isolation,
            finished: false,
        }
    }

    fn finish(&mut self, statement: &str, outcome: &str) -> ContextResult<()> {
        // Marked first: a failed COMMIT must not be retried by `Drop`.
        self.finished = true;
        let conn = self.shared.connection()?;
        let result = conn.execute_batch(statement);
        if self.isolation == IsolationLevel::ReadUncommitted {
            conn.execute_batch("PRAGMA read_uncommitted = 0;")?;
        }

        match result {
            Ok(()) => {
                info!(
                    "event=tx_{outcome} module=db status=ok isolation={}",
                    self.isolation
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=tx_{outcome} module=db status=error isolation={} error={}",
                    self.isolation, err
                );
                if !conn.is_autocommit() {
                    conn.execute_batch("ROLLBACK;")?;
                }
                Err(err.into())
            }
        }
    }
}

impl TransactionHandle for SqliteTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    fn commit(mut self) -> ContextResult<()> {
        self.finish("COMMIT;", "commit")
    }

    fn rollback(mut self) -> ContextResult<()> {
        self.finish("ROLLBACK;", "rollback")
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Ok(conn) = self.shared.connection() else {
            return;
        };
        if conn.is_autocommit() {
            return;
        }

        warn!(
            "event=tx_abandoned module=db status=rollback isolation={}",
            self.isolation
        );
        if let Err(err) = conn.execute_batch("ROLLBACK;") {
            warn!("event=tx_abandoned module=db status=error error={err}");
        }
        if self.isolation == IsolationLevel::ReadUncommitted {
            let _ = conn.execute_batch("PRAGMA read_uncommitted = 0;");
        }
    }
}
