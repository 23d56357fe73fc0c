//! Single-slot transaction state.
//!
//! States: no transaction -> open -> (committed | rolled back) -> no
//! transaction. A second `begin` while open is rejected and leaves the open
//! transaction untouched.

use super::{UnitOfWorkError, UowResult};
use crate::context::{ContextResult, IsolationLevel, TransactionHandle};
use std::cell::RefCell;

pub(crate) struct TransactionController<H> {
    current: RefCell<Option<H>>,
}

impl<H: TransactionHandle> TransactionController<H> {
    pub(crate) fn new() -> Self {
        Self {
            current: RefCell::new(None),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub(crate) fn isolation_level(&self) -> Option<IsolationLevel> {
        self.current
            .borrow()
            .as_ref()
            .map(TransactionHandle::isolation_level)
    }

    /// Starts a transaction through `start` and keeps its handle.
    pub(crate) fn begin<F>(&self, isolation: IsolationLevel, start: F) -> UowResult<()>
    where
        F: FnOnce(IsolationLevel) -> ContextResult<H>,
    {
        if let Some(active) = self.isolation_level() {
            return Err(UnitOfWorkError::TransactionAlreadyActive { isolation: active });
        }
        let handle = start(isolation)?;
        *self.current.borrow_mut() = Some(handle);
        Ok(())
    }

    pub(crate) fn commit(&self) -> UowResult<bool> {
        let handle = self.require("commit")?;
        handle.commit()?;
        Ok(true)
    }

    pub(crate) fn rollback(&self) -> UowResult<()> {
        let handle = self.require("rollback")?;
        handle.rollback()?;
        Ok(())
    }

    /// Detaches the open handle, if any.
    pub(crate) fn take(&self) -> Option<H> {
        self.current.borrow_mut().take()
    }

    fn require(&self, operation: &'static str) -> UowResult<H> {
        self.take()
            .ok_or(UnitOfWorkError::NoActiveTransaction { operation })
    }
}
