use super::transaction::TransactionController;
use super::{ConstructionFailure, UnitOfWorkError, UowResult};
use crate::config::UnitOfWorkOptions;
use crate::context::{
    Command, ConnectionState, ContextResult, DataContext, DataRow, IsolationLevel,
    TransactionHandle,
};
use crate::model::Entity;
use crate::params::Parameters;
use crate::repo::{EntityRepository, LocatorMode, Repository, RepositoryCache, RepositoryLocator};
use log::{debug, error, info, warn};
use std::any::type_name;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct UnitOfWorkInner<C: DataContext> {
    context: Rc<C>,
    repositories: RefCell<RepositoryCache>,
    transactions: TransactionController<C::Transaction>,
    locator: Option<RepositoryLocator>,
    options: UnitOfWorkOptions,
}

impl<C: DataContext> Drop for UnitOfWorkInner<C> {
    fn drop(&mut self) {
        let Some(handle) = self.transactions.take() else {
            return;
        };
        let isolation = handle.isolation_level();
        match handle.rollback() {
            Ok(()) => warn!(
                "event=uow_drop module=uow status=ok open_transaction=rolled_back isolation={}",
                isolation
            ),
            Err(err) => error!(
                "event=uow_drop module=uow status=error isolation={} error={}",
                isolation, err
            ),
        }
    }
}

/// Coordinates repositories, one transaction and raw statements over a
/// shared `DataContext`.
///
/// Cloning yields another handle to the same unit of work.
pub struct UnitOfWork<C: DataContext> {
    inner: Rc<UnitOfWorkInner<C>>,
}

impl<C: DataContext> Clone for UnitOfWork<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Non-owning back-reference held by repositories.
pub struct WeakUnitOfWork<C: DataContext> {
    inner: Weak<UnitOfWorkInner<C>>,
}

impl<C: DataContext> Clone for WeakUnitOfWork<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<C: DataContext> WeakUnitOfWork<C> {
    pub fn upgrade(&self) -> Option<UnitOfWork<C>> {
        self.inner.upgrade().map(|inner| UnitOfWork { inner })
    }
}

pub struct UnitOfWorkBuilder<C: DataContext> {
    context: C,
    options: UnitOfWorkOptions,
    locator: Option<RepositoryLocator>,
}

impl<C: DataContext> UnitOfWorkBuilder<C> {
    pub fn options(mut self, options: UnitOfWorkOptions) -> Self {
        self.options = options;
        self
    }

    pub fn locator(mut self, locator: RepositoryLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Applies the configured command timeout and creates the coordinator.
    ///
    /// Without an explicit locator, an empty one in the configured
    /// `locator_mode` is used.
    pub fn build(self) -> UowResult<UnitOfWork<C>> {
        if let Some(timeout) = self.options.command_timeout() {
            self.context.set_command_timeout(Some(timeout))?;
        }
        let locator = self.locator.unwrap_or_else(|| self.options.locator());
        Ok(UnitOfWork::from_parts(
            self.context,
            Some(locator),
            self.options,
        ))
    }
}

impl<C: DataContext> UnitOfWork<C> {
    pub fn new(context: C) -> Self {
        Self::from_parts(context, None, UnitOfWorkOptions::default())
    }

    /// Creates a coordinator that consults `locator` before building its own
    /// repositories.
    pub fn with_locator(context: C, locator: RepositoryLocator) -> Self {
        Self::from_parts(context, Some(locator), UnitOfWorkOptions::default())
    }

    pub fn builder(context: C) -> UnitOfWorkBuilder<C> {
        UnitOfWorkBuilder {
            context,
            options: UnitOfWorkOptions::default(),
            locator: None,
        }
    }

    fn from_parts(
        context: C,
        locator: Option<RepositoryLocator>,
        options: UnitOfWorkOptions,
    ) -> Self {
        debug!(
            "event=uow_create module=uow status=ok locator={} default_isolation={}",
            locator.as_ref().is_some_and(RepositoryLocator::is_configured),
            options.default_isolation
        );
        Self {
            inner: Rc::new(UnitOfWorkInner {
                context: Rc::new(context),
                repositories: RefCell::new(RepositoryCache::new()),
                transactions: TransactionController::new(),
                locator,
                options,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakUnitOfWork<C> {
        WeakUnitOfWork {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// The context shared by this coordinator and all of its repositories.
    pub fn context(&self) -> &Rc<C> {
        &self.inner.context
    }

    pub fn options(&self) -> &UnitOfWorkOptions {
        &self.inner.options
    }

    /// Returns the repository for `T`.
    ///
    /// A registration in the locator wins. Otherwise the repository is built
    /// on first request and the same instance is returned afterwards.
    ///
    /// # Errors
    /// - `Construction` when the locator is required and has no
    ///   registration, when the entity mapping does not match the store, or
    ///   when the cached handle has an unexpected type.
    pub fn repository<T: Entity>(&self) -> UowResult<Rc<dyn EntityRepository<T>>> {
        let entity = type_name::<T>();

        if let Some(locator) = &self.inner.locator {
            if let Some(repository) = locator.resolve::<T>() {
                debug!("event=repository_resolve module=uow status=ok source=locator entity={entity}");
                return Ok(repository);
            }
            if locator.mode() == LocatorMode::Required {
                warn!("event=repository_resolve module=uow status=error source=locator entity={entity} reason=missing_registration");
                return Err(construction(entity, ConstructionFailure::MissingRegistration));
            }
        }

        let cached = self
            .inner
            .repositories
            .borrow()
            .get::<T>()
            .map_err(|_| construction(entity, ConstructionFailure::HandleTypeMismatch))?;
        if let Some(repository) = cached {
            return Ok(repository);
        }

        // Built without holding the cache borrow: construction may resolve
        // related repositories through this coordinator.
        let repository = Repository::<T, C>::try_new(Rc::clone(&self.inner.context), self.downgrade())
            .map_err(|err| {
                warn!("event=repository_create module=uow status=error entity={entity} error={err}");
                construction(entity, ConstructionFailure::Schema(err))
            })?;
        let repository: Rc<dyn EntityRepository<T>> = Rc::new(repository);
        self.inner
            .repositories
            .borrow_mut()
            .insert::<T>(Rc::clone(&repository));
        info!(
            "event=repository_create module=uow status=ok entity={entity} table={}",
            T::TABLE
        );
        Ok(repository)
    }

    /// Number of repositories cached by this coordinator.
    pub fn repository_count(&self) -> usize {
        self.inner.repositories.borrow().len()
    }

    pub fn pending_changes(&self) -> usize {
        self.inner.context.pending_changes()
    }

    /// Flushes every staged change atomically and returns the affected row
    /// count. On failure the staged changes are kept.
    pub fn save_changes(&self) -> UowResult<usize> {
        Ok(self.inner.context.save_changes()?)
    }

    pub async fn save_changes_async(&self, cancel: &CancellationToken) -> UowResult<usize> {
        Ok(self.inner.context.save_changes_async(cancel).await?)
    }

    /// Runs a statement that returns no rows.
    pub fn execute_sql_command(
        &self,
        sql: &str,
        parameters: impl Into<Parameters>,
    ) -> UowResult<usize> {
        let command = Command::with_parameters(sql, parameters.into());
        Ok(self.inner.context.execute_non_query(&command)?)
    }

    pub async fn execute_sql_command_async(
        &self,
        sql: &str,
        parameters: impl Into<Parameters>,
    ) -> UowResult<usize> {
        self.execute_sql_command_async_with_cancel(sql, parameters, &CancellationToken::new())
            .await
    }

    pub async fn execute_sql_command_async_with_cancel(
        &self,
        sql: &str,
        parameters: impl Into<Parameters>,
        cancel: &CancellationToken,
    ) -> UowResult<usize> {
        let command = Command::with_parameters(sql, parameters.into());
        Ok(self
            .inner
            .context
            .execute_non_query_async(&command, cancel)
            .await?)
    }

    /// Streams every row of `sql` into `on_row`, in result order, and
    /// returns the number of rows visited.
    ///
    /// An error from `on_row` stops the iteration and is returned as is.
    pub fn execute_data_reader<F>(
        &self,
        sql: &str,
        parameters: impl Into<Parameters>,
        mut on_row: F,
    ) -> UowResult<usize>
    where
        F: FnMut(&DataRow<'_>) -> ContextResult<()>,
    {
        let command = Command::with_parameters(sql, parameters.into());
        Ok(self.inner.context.execute_reader(&command, &mut on_row)?)
    }

    /// Async variant of `execute_data_reader`; `cancel` is checked before
    /// submission and after every row.
    pub async fn execute_data_reader_async<F>(
        &self,
        sql: &str,
        parameters: impl Into<Parameters>,
        cancel: &CancellationToken,
        mut on_row: F,
    ) -> UowResult<usize>
    where
        F: FnMut(&DataRow<'_>) -> ContextResult<()>,
    {
        let command = Command::with_parameters(sql, parameters.into());
        Ok(self
            .inner
            .context
            .execute_reader_async(&command, cancel, &mut on_row)
            .await?)
    }

    /// Starts a transaction, opening the connection first when needed.
    pub fn begin_transaction(&self, isolation: IsolationLevel) -> UowResult<()> {
        let context = &self.inner.context;
        self.inner.transactions.begin(isolation, |level| {
            if context.connection_state() == ConnectionState::Closed {
                context.open()?;
            }
            context.begin_transaction(level)
        })?;
        debug!("event=uow_tx_begin module=uow status=ok isolation={isolation}");
        Ok(())
    }

    /// Starts a transaction at the configured default isolation level.
    pub fn begin(&self) -> UowResult<()> {
        self.begin_transaction(self.inner.options.default_isolation)
    }

    pub fn commit(&self) -> UowResult<bool> {
        self.inner.transactions.commit()
    }

    pub fn rollback(&self) -> UowResult<()> {
        self.inner.transactions.rollback()
    }

    pub fn has_active_transaction(&self) -> bool {
        self.inner.transactions.is_active()
    }

    pub fn active_isolation_level(&self) -> Option<IsolationLevel> {
        self.inner.transactions.isolation_level()
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.inner.context.command_timeout()
    }

    pub fn set_command_timeout(&self, timeout: Option<Duration>) -> UowResult<()> {
        Ok(self.inner.context.set_command_timeout(timeout)?)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.context.connection_state()
    }

    /// Rolls back an open transaction, then closes the connection.
    pub fn close(&self) -> UowResult<()> {
        if let Some(handle) = self.inner.transactions.take() {
            warn!(
                "event=uow_close module=uow status=ok open_transaction=rolled_back isolation={}",
                handle.isolation_level()
            );
            handle.rollback()?;
        }
        Ok(self.inner.context.close()?)
    }
}

fn construction(entity: &'static str, reason: ConstructionFailure) -> UnitOfWorkError {
    UnitOfWorkError::Construction { entity, reason }
}
