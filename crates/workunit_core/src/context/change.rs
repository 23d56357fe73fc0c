use super::SqlValue;
use std::fmt::{Display, Formatter};

/// Kind of row mutation staged by a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// One staged row mutation, flushed by `DataContext::save_changes`.
///
/// `columns` and `values` are aligned. Deletes carry only the key.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub kind: ChangeKind,
    pub table: &'static str,
    pub key_column: &'static str,
    pub key: SqlValue,
    pub columns: Vec<&'static str>,
    pub values: Vec<SqlValue>,
}

impl PendingChange {
    pub fn insert(
        table: &'static str,
        key_column: &'static str,
        key: SqlValue,
        columns: Vec<&'static str>,
        values: Vec<SqlValue>,
    ) -> Self {
        Self {
            kind: ChangeKind::Insert,
            table,
            key_column,
            key,
            columns,
            values,
        }
    }

    pub fn update(
        table: &'static str,
        key_column: &'static str,
        key: SqlValue,
        columns: Vec<&'static str>,
        values: Vec<SqlValue>,
    ) -> Self {
        Self {
            kind: ChangeKind::Update,
            table,
            key_column,
            key,
            columns,
            values,
        }
    }

    pub fn delete(table: &'static str, key_column: &'static str, key: SqlValue) -> Self {
        Self {
            kind: ChangeKind::Delete,
            table,
            key_column,
            key,
            columns: Vec::new(),
            values: Vec::new(),
        }
    }
}
