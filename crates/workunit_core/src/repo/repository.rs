//! Generic table-per-entity repository.
//!
//! # Responsibility
//! - Provide `EntityRepository` for any `Entity` over any `DataContext`.
//! - Validate the entity mapping against the live schema on construction.
//!
//! # Invariants
//! - Construction fails unless the table and every declared column exist.
//! - Staged changes carry exactly one value per declared column.
//! - Updates always assign at least one non-key column.

use super::{EntityRepository, RepoError, RepoResult};
use crate::context::{Command, ContextResult, DataContext, DataRow, PendingChange, SqlValue};
use crate::db::quote;
use crate::model::Entity;
use crate::params::Parameters;
use crate::uow::{UnitOfWork, WeakUnitOfWork};
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::type_name;
use std::marker::PhantomData;
use std::rc::Rc;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Default repository built by the unit of work on a cache miss.
pub struct Repository<T: Entity, C: DataContext> {
    context: Rc<C>,
    unit_of_work: WeakUnitOfWork<C>,
    select_sql: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, C: DataContext> Repository<T, C> {
    /// Builds a repository sharing `context` with the unit of work it
    /// belongs to.
    ///
    /// # Errors
    /// - `InvalidIdentifier` for table/column names that are not plain
    ///   identifiers.
    /// - `UndeclaredKeyColumn` when the key is not among `T::columns()`.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema does
    ///   not match the entity mapping.
    pub fn try_new(context: Rc<C>, unit_of_work: WeakUnitOfWork<C>) -> RepoResult<Self> {
        ensure_identifier(T::TABLE)?;
        for &column in T::columns() {
            ensure_identifier(column)?;
        }
        if !T::columns().contains(&T::KEY_COLUMN) {
            return Err(RepoError::UndeclaredKeyColumn {
                table: T::TABLE,
                column: T::KEY_COLUMN,
            });
        }

        let existing = context.table_columns(T::TABLE)?;
        if existing.is_empty() {
            return Err(RepoError::MissingRequiredTable(T::TABLE));
        }
        if let Some(&column) = T::columns()
            .iter()
            .find(|column| !existing.iter().any(|name| name.eq_ignore_ascii_case(column)))
        {
            return Err(RepoError::MissingRequiredColumn {
                table: T::TABLE,
                column,
            });
        }

        let columns: Vec<String> = T::columns().iter().map(|column| quote(column)).collect();
        let select_sql = format!("SELECT {} FROM {}", columns.join(", "), quote(T::TABLE));

        Ok(Self {
            context,
            unit_of_work,
            select_sql,
            _entity: PhantomData,
        })
    }

    /// Returns the owning unit of work while it is alive.
    pub fn unit_of_work(&self) -> Option<UnitOfWork<C>> {
        self.unit_of_work.upgrade()
    }

    /// Resolves the repository of a related entity through the same unit of
    /// work.
    pub fn related<U: Entity>(&self) -> RepoResult<Rc<dyn EntityRepository<U>>> {
        let unit_of_work = self
            .unit_of_work()
            .ok_or(RepoError::Detached(type_name::<T>()))?;
        Ok(unit_of_work.repository::<U>()?)
    }

    fn load(&self, command: &Command) -> RepoResult<Vec<T>> {
        let mut items = Vec::new();
        self.context
            .execute_reader(command, &mut |row: &DataRow<'_>| -> ContextResult<()> {
                items.push(T::from_row(row)?);
                Ok(())
            })?;
        Ok(items)
    }

    fn checked_values(&self, entity: &T) -> RepoResult<Vec<SqlValue>> {
        let values = entity.values();
        if values.len() != T::columns().len() {
            return Err(RepoError::ValueCountMismatch {
                table: T::TABLE,
                columns: T::columns().len(),
                values: values.len(),
            });
        }
        Ok(values)
    }
}

impl<T: Entity, C: DataContext> EntityRepository<T> for Repository<T, C> {
    fn find(&self, key: SqlValue) -> RepoResult<Option<T>> {
        let command = Command::with_parameters(
            format!("{} WHERE {} = @0 LIMIT 1", self.select_sql, quote(T::KEY_COLUMN)),
            Parameters::positional([key]),
        );
        Ok(self.load(&command)?.into_iter().next())
    }

    fn all(&self) -> RepoResult<Vec<T>> {
        self.load(&Command::text(self.select_sql.as_str()))
    }

    fn query(&self, filter: &str, parameters: Parameters) -> RepoResult<Vec<T>> {
        let filter = filter.trim();
        if filter.is_empty() {
            return self.all();
        }
        let command =
            Command::with_parameters(format!("{} WHERE {filter}", self.select_sql), parameters);
        self.load(&command)
    }

    fn insert(&self, entity: &T) -> RepoResult<()> {
        let values = self.checked_values(entity)?;
        self.context.track(PendingChange::insert(
            T::TABLE,
            T::KEY_COLUMN,
            entity.key(),
            T::columns().to_vec(),
            values,
        ));
        Ok(())
    }

    fn update(&self, entity: &T) -> RepoResult<()> {
        if T::columns().iter().all(|column| *column == T::KEY_COLUMN) {
            return Err(RepoError::NothingToUpdate(T::TABLE));
        }
        let values = self.checked_values(entity)?;
        self.context.track(PendingChange::update(
            T::TABLE,
            T::KEY_COLUMN,
            entity.key(),
            T::columns().to_vec(),
            values,
        ));
        Ok(())
    }

    fn delete(&self, entity: &T) -> RepoResult<()> {
        self.context
            .track(PendingChange::delete(T::TABLE, T::KEY_COLUMN, entity.key()));
        Ok(())
    }
}

fn ensure_identifier(name: &'static str) -> RepoResult<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(RepoError::InvalidIdentifier(name))
    }
}
