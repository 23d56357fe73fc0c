//! Statement preparation, parameter placement and change SQL.

use crate::context::{
    ChangeKind, Command, ContextError, ContextResult, DataRow, PendingChange, RowHandler,
    SqlValue, StatementParameter,
};
use rusqlite::{params_from_iter, Connection, Statement};
use tokio_util::sync::CancellationToken;

const NAME_PREFIXES: [char; 3] = ['@', ':', '$'];

/// Prepares `command` and binds every parameter onto a placeholder.
///
/// Each placeholder of the statement must receive exactly one value.
pub(crate) fn prepare_bound<'conn>(
    conn: &'conn Connection,
    command: &Command,
) -> ContextResult<Statement<'conn>> {
    let mut stmt = conn.prepare(command.sql())?;
    let expected = stmt.parameter_count();
    let mut bound = vec![false; expected];

    for (position, parameter) in command.parameters().iter().enumerate() {
        let index = placeholder_index(&stmt, parameter, position)?;
        if bound[index - 1] {
            return Err(ContextError::ParameterMismatch(format!(
                "parameter `{}` targets placeholder {index}, which already has a value",
                parameter.name()
            )));
        }
        stmt.raw_bind_parameter(index, parameter.value())?;
        bound[index - 1] = true;
    }

    if let Some(missing) = bound.iter().position(|is_bound| !is_bound) {
        let placeholder = stmt.parameter_name(missing + 1).unwrap_or("?").to_string();
        return Err(ContextError::ParameterMismatch(format!(
            "placeholder `{placeholder}` at position {} has no bound value",
            missing + 1
        )));
    }

    Ok(stmt)
}

fn placeholder_index(
    stmt: &Statement<'_>,
    parameter: &StatementParameter,
    position: usize,
) -> ContextResult<usize> {
    let name = parameter.name();
    if name.starts_with(NAME_PREFIXES) {
        if let Some(index) = stmt.parameter_index(name)? {
            return Ok(index);
        }
    } else {
        for prefix in NAME_PREFIXES {
            if let Some(index) = stmt.parameter_index(&format!("{prefix}{name}"))? {
                return Ok(index);
            }
        }
    }

    // Positional values may also target anonymous `?` / `?NNN` placeholders.
    if parameter.ordinal().is_some() {
        let index = position + 1;
        if index <= stmt.parameter_count() {
            let anonymous = match stmt.parameter_name(index) {
                None => true,
                Some(placeholder) => placeholder == format!("?{index}"),
            };
            if anonymous {
                return Ok(index);
            }
        }
    }

    Err(ContextError::ParameterMismatch(format!(
        "statement has no placeholder for parameter `{name}`"
    )))
}

/// Runs a bound statement and visits each produced row.
///
/// The row cursor lives on this stack frame: it is released on every exit
/// path, including callback failure and cancellation.
pub(crate) fn stream_rows(
    conn: &Connection,
    command: &Command,
    cancel: Option<&CancellationToken>,
    on_row: &mut RowHandler<'_>,
) -> ContextResult<usize> {
    let mut stmt = prepare_bound(conn, command)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut values: Vec<SqlValue> = Vec::with_capacity(columns.len());
    let mut visited = 0;

    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        values.clear();
        for index in 0..columns.len() {
            values.push(row.get::<_, SqlValue>(index)?);
        }
        on_row(&DataRow::new(&columns, &values))?;
        visited += 1;

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(ContextError::Cancelled);
        }
    }

    Ok(visited)
}

/// Executes one staged change and enforces its row-count contract.
pub(crate) fn apply_change(conn: &Connection, change: &PendingChange) -> ContextResult<usize> {
    let sql = change_sql(change);
    let affected = match change.kind {
        ChangeKind::Insert => conn.execute(&sql, params_from_iter(change.values.iter()))?,
        ChangeKind::Update => {
            let mut values: Vec<&SqlValue> = change
                .columns
                .iter()
                .zip(change.values.iter())
                .filter(|(column, _)| **column != change.key_column)
                .map(|(_, value)| value)
                .collect();
            values.push(&change.key);
            conn.execute(&sql, params_from_iter(values))?
        }
        ChangeKind::Delete => conn.execute(&sql, [&change.key])?,
    };

    if affected == 0 && change.kind != ChangeKind::Insert {
        return Err(ContextError::ConcurrencyConflict {
            kind: change.kind,
            table: change.table,
            key: format!("{:?}", change.key),
        });
    }
    Ok(affected)
}

pub(crate) fn change_sql(change: &PendingChange) -> String {
    let table = quote(change.table);
    let key = quote(change.key_column);
    match change.kind {
        ChangeKind::Insert => {
            let columns: Vec<String> = change.columns.iter().map(|c| quote(c)).collect();
            let placeholders: Vec<String> =
                (1..=change.columns.len()).map(|i| format!("?{i}")).collect();
            format!(
                "INSERT INTO {table} ({}) VALUES ({});",
                columns.join(", "),
                placeholders.join(", ")
            )
        }
        ChangeKind::Update => {
            let assignments: Vec<String> = change
                .columns
                .iter()
                .filter(|column| **column != change.key_column)
                .enumerate()
                .map(|(i, column)| format!("{} = ?{}", quote(column), i + 1))
                .collect();
            format!(
                "UPDATE {table} SET {} WHERE {key} = ?{};",
                assignments.join(", "),
                assignments.len() + 1
            )
        }
        ChangeKind::Delete => format!("DELETE FROM {table} WHERE {key} = ?1;"),
    }
}

pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
