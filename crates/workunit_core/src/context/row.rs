use super::{ContextError, ContextResult, SqlValue};
use rusqlite::types::{FromSql, ValueRef};

/// Borrowed view of the row a reader is positioned on.
///
/// Only valid inside the row callback; the backing buffer is reused for the
/// next row.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    columns: &'a [String],
    values: &'a [SqlValue],
}

impl<'a> DataRow<'a> {
    pub fn new(columns: &'a [String], values: &'a [SqlValue]) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    pub fn values(&self) -> &'a [SqlValue] {
        self.values
    }

    /// Returns the raw value of `column`, matched case-insensitively.
    pub fn value(&self, column: &str) -> Option<&'a SqlValue> {
        self.columns
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))
            .and_then(|index| self.values.get(index))
    }

    /// Reads `column` converted to `T`.
    pub fn get<T: FromSql>(&self, column: &str) -> ContextResult<T> {
        let value = self
            .value(column)
            .ok_or_else(|| ContextError::InvalidColumn {
                column: column.to_string(),
                reason: "column is not part of the result set".to_string(),
            })?;
        T::column_result(ValueRef::from(value)).map_err(|err| ContextError::InvalidColumn {
            column: column.to_string(),
            reason: err.to_string(),
        })
    }
}
