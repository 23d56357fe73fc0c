//! `workunit` command-line entry point.
//!
//! # Commands
//!
//! - `exec` - run a statement and print the affected row count
//! - `query` - stream result rows as one JSON object per line

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde_json::{Map, Number, Value};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use workunit_core::{
    default_log_level, init_logging, DataRow, DbTarget, IsolationLevel, Parameters,
    SqlValue, SqliteContext, SqliteOptions, UnitOfWork, WorkunitConfig,
};

/// Run SQL through a unit of work.
#[derive(Parser)]
#[command(name = "workunit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database file; in-memory when omitted
    #[arg(global = true, long)]
    db: Option<PathBuf>,

    /// JSON configuration file
    #[arg(global = true, long)]
    config: Option<PathBuf>,

    /// Command timeout in milliseconds
    #[arg(global = true, long)]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(global = true, long)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off without it
    #[arg(global = true, long)]
    log_dir: Option<PathBuf>,

    /// Wrap the statement in a transaction and commit it
    #[arg(global = true, long)]
    in_transaction: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a statement and print the number of affected rows
    Exec(Statement),
    /// Execute a query and print each row as JSON
    Query(Statement),
}

#[derive(Args)]
struct Statement {
    /// SQL text
    sql: String,

    /// Positional parameter, bound as @0, @1, ...
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,

    /// Named parameter as name=value
    #[arg(short = 'n', long = "named")]
    named: Vec<String>,
}

impl Statement {
    fn parameters(&self) -> Result<Parameters> {
        match (self.params.is_empty(), self.named.is_empty()) {
            (true, true) => Ok(Parameters::None),
            (false, true) => Ok(Parameters::positional(
                self.params.iter().map(|raw| parse_value(raw)),
            )),
            (true, false) => {
                let members = self
                    .named
                    .iter()
                    .map(|pair| -> Result<(String, Option<SqlValue>)> {
                        let (name, raw) = pair
                            .split_once('=')
                            .with_context(|| format!("named parameter `{pair}` is not name=value"))?;
                        Ok((name.trim().to_string(), parse_value(raw)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Parameters::named(members))
            }
            (false, false) => bail!("positional and named parameters cannot be mixed"),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or_else(|| default_log_level());
        let log_dir = log_dir
            .to_str()
            .context("log directory must be valid UTF-8")?;
        init_logging(level, log_dir)?;
    }

    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config `{}`", path.display()))?;
            WorkunitConfig::from_json_str(&raw)?
        }
        None => WorkunitConfig::default(),
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        config.unit_of_work.command_timeout_ms = Some(timeout_ms);
    }

    let context = open_context(cli.db.as_deref(), config.sqlite)?;
    let target = match context.target() {
        DbTarget::File(path) => path.display().to_string(),
        DbTarget::Memory => ":memory:".to_string(),
    };
    let unit = UnitOfWork::builder(context)
        .options(config.unit_of_work)
        .build()?;
    info!("event=cli_start module=cli status=ok target={target}");

    if cli.in_transaction {
        unit.begin()?;
    }

    let cancel = CancellationToken::new();
    match &cli.command {
        Commands::Exec(statement) => {
            let affected = unit
                .execute_sql_command_async_with_cancel(
                    &statement.sql,
                    statement.parameters()?,
                    &cancel,
                )
                .await?;
            println!("{affected}");
        }
        Commands::Query(statement) => {
            unit.execute_data_reader_async(
                &statement.sql,
                statement.parameters()?,
                &cancel,
                |row: &DataRow<'_>| {
                    println!("{}", Value::Object(row_to_json(row)));
                    Ok(())
                },
            )
            .await?;
        }
    }

    if unit.has_active_transaction() {
        let isolation = unit.active_isolation_level().unwrap_or(IsolationLevel::Unspecified);
        unit.commit()?;
        info!("event=cli_commit module=cli status=ok isolation={isolation}");
    }
    unit.close()?;
    Ok(())
}

/// Attaches to `db` with its schema left as the owning application
/// migrated it; without a path the database is a scratch in-memory one.
fn open_context(db: Option<&Path>, options: SqliteOptions) -> Result<SqliteContext> {
    let context = match db {
        Some(path) => SqliteContext::attach_file(path, options)
            .with_context(|| format!("failed to open database `{}`", path.display()))?,
        None => SqliteContext::open_in_memory(&[], options)?,
    };
    Ok(context)
}

/// `null` binds NULL; integers and floats bind numerically; everything else
/// binds as text.
fn parse_value(raw: &str) -> Option<SqlValue> {
    if raw.eq_ignore_ascii_case("null") {
        return None;
    }
    if let Ok(integer) = raw.parse::<i64>() {
        return Some(SqlValue::Integer(integer));
    }
    if let Ok(real) = raw.parse::<f64>() {
        if real.is_finite() {
            return Some(SqlValue::Real(real));
        }
    }
    Some(SqlValue::Text(raw.to_string()))
}

fn row_to_json(row: &DataRow<'_>) -> Map<String, Value> {
    row.columns()
        .iter()
        .zip(row.values())
        .map(|(column, value)| (column.clone(), value_to_json(value)))
        .collect()
}

fn value_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(integer) => Value::from(*integer),
        SqlValue::Real(real) => Number::from_f64(*real).map_or(Value::Null, Value::Number),
        SqlValue::Text(text) => Value::String(text.clone()),
        SqlValue::Blob(bytes) => Value::String(bytes.iter().map(|b| format!("{b:02x}")).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::{open_context, parse_value, value_to_json, Statement};
    use serde_json::json;
    use workunit_core::{
        DataContext, Migration, Parameters, SqlValue, SqliteContext, SqliteOptions, UnitOfWork,
    };

    fn statement(params: &[&str], named: &[&str]) -> Statement {
        Statement {
            sql: "SELECT 1".to_string(),
            params: params.iter().map(|s| s.to_string()).collect(),
            named: named.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn values_parse_by_shape() {
        assert_eq!(parse_value("NULL"), None);
        assert_eq!(parse_value("42"), Some(SqlValue::Integer(42)));
        assert_eq!(parse_value("2.5"), Some(SqlValue::Real(2.5)));
        assert_eq!(parse_value("inf"), Some(SqlValue::Text("inf".to_string())));
        assert_eq!(parse_value("ada"), Some(SqlValue::Text("ada".to_string())));
    }

    #[test]
    fn named_parameters_keep_order_and_reject_mixing() {
        match statement(&[], &["b=1", "a=x"]).parameters().unwrap() {
            Parameters::Named(members) => {
                let names: Vec<_> = members.iter().map(|(name, _)| name.as_str()).collect();
                assert_eq!(names, vec!["b", "a"]);
            }
            _ => panic!("expected named parameters"),
        }
        assert!(statement(&["1"], &["a=1"]).parameters().is_err());
        assert!(statement(&[], &["missing"]).parameters().is_err());
    }

    #[test]
    fn blobs_render_as_hex() {
        assert_eq!(value_to_json(&SqlValue::Blob(vec![0x0a, 0xff])), json!("0aff"));
        assert_eq!(value_to_json(&SqlValue::Real(f64::NAN)), json!(null));
    }

    #[test]
    fn db_option_attaches_to_a_migrated_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let schema = [Migration::new(
            1,
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);",
        )];
        SqliteContext::open_file(&path, &schema, SqliteOptions::default())
            .unwrap()
            .close()
            .unwrap();

        let context = open_context(Some(path.as_path()), SqliteOptions::default()).unwrap();
        assert_eq!(context.table_columns("notes").unwrap(), vec!["id", "body"]);
        let unit = UnitOfWork::new(context);
        let affected = unit
            .execute_sql_command(
                "INSERT INTO notes (id, body) VALUES (@0, @1)",
                Parameters::positional([Some("1"), Some("hello")]),
            )
            .unwrap();
        assert_eq!(affected, 1);
        unit.close().unwrap();

        let reopened = SqliteContext::open_file(&path, &schema, SqliteOptions::default()).unwrap();
        assert_eq!(reopened.table_columns("notes").unwrap().len(), 2);
    }
}
