#![allow(dead_code)]

use uuid::Uuid;
use workunit_core::{
    ContextError, ContextResult, DataRow, Entity, Migration, Parameters, SqlValue, SqliteContext,
    SqliteOptions, Trackable, TrackingState, UnitOfWork,
};

pub const MIGRATIONS: &[Migration] = &[
    Migration::new(
        1,
        "CREATE TABLE customers (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );",
    ),
    Migration::new(
        2,
        "CREATE TABLE orders (
            id TEXT PRIMARY KEY,
            customer_id INTEGER NOT NULL,
            total_cents INTEGER NOT NULL CHECK (total_cents >= 0),
            note TEXT
        );",
    ),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: i64,
    pub total_cents: i64,
    pub note: Option<String>,
    pub state: TrackingState,
}

impl Order {
    pub fn new(customer_id: i64, total_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            total_cents,
            note: None,
            state: TrackingState::Added,
        }
    }
}

impl Trackable for Order {
    fn tracking_state(&self) -> TrackingState {
        self.state
    }

    fn set_tracking_state(&mut self, state: TrackingState) {
        self.state = state;
    }
}

impl Entity for Order {
    const TABLE: &'static str = "orders";
    const KEY_COLUMN: &'static str = "id";

    fn columns() -> &'static [&'static str] {
        &["id", "customer_id", "total_cents", "note"]
    }

    fn key(&self) -> SqlValue {
        SqlValue::Text(self.id.to_string())
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.key(),
            SqlValue::Integer(self.customer_id),
            SqlValue::Integer(self.total_cents),
            self.note.clone().map_or(SqlValue::Null, SqlValue::Text),
        ]
    }

    fn from_row(row: &DataRow<'_>) -> ContextResult<Self> {
        let raw_id: String = row.get("id")?;
        let id = Uuid::parse_str(&raw_id).map_err(|err| ContextError::InvalidColumn {
            column: "id".to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            id,
            customer_id: row.get("customer_id")?,
            total_cents: row.get("total_cents")?,
            note: row.get("note")?,
            state: TrackingState::Unchanged,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
}

impl Trackable for Customer {
    fn tracking_state(&self) -> TrackingState {
        TrackingState::Unchanged
    }

    fn set_tracking_state(&mut self, _state: TrackingState) {}
}

impl Entity for Customer {
    const TABLE: &'static str = "customers";
    const KEY_COLUMN: &'static str = "id";

    fn columns() -> &'static [&'static str] {
        &["id", "name"]
    }

    fn key(&self) -> SqlValue {
        SqlValue::Integer(self.id)
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![self.key(), SqlValue::Text(self.name.clone())]
    }

    fn from_row(row: &DataRow<'_>) -> ContextResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}

pub fn memory_context() -> SqliteContext {
    SqliteContext::open_in_memory(MIGRATIONS, SqliteOptions::default()).unwrap()
}

pub fn memory_unit() -> UnitOfWork<SqliteContext> {
    UnitOfWork::new(memory_context())
}

pub fn count_rows(unit: &UnitOfWork<SqliteContext>, table: &str) -> i64 {
    let mut count = 0;
    unit.execute_data_reader(
        &format!("SELECT COUNT(*) AS total FROM {table}"),
        Parameters::None,
        |row: &DataRow<'_>| {
            count = row.get("total")?;
            Ok(())
        },
    )
    .unwrap();
    count
}
