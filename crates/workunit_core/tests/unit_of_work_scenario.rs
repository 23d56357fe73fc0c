mod common;

use common::{count_rows, memory_unit, Customer, Order};
use workunit_core::context::ChangeKind;
use workunit_core::{
    ContextError, ContextResult, DataRow, Entity, Parameters, RepoError, SqlValue, Trackable,
    TrackingState, UnitOfWorkError,
};

/// Maps only the key column of `customers`.
#[derive(Debug, Clone)]
struct CustomerKey {
    id: i64,
}

impl Trackable for CustomerKey {
    fn tracking_state(&self) -> TrackingState {
        TrackingState::Modified
    }
    fn set_tracking_state(&mut self, _state: TrackingState) {}
}

impl Entity for CustomerKey {
    const TABLE: &'static str = "customers";
    const KEY_COLUMN: &'static str = "id";
    fn columns() -> &'static [&'static str] {
        &["id"]
    }
    fn key(&self) -> SqlValue {
        SqlValue::Integer(self.id)
    }
    fn values(&self) -> Vec<SqlValue> {
        vec![self.key()]
    }
    fn from_row(row: &DataRow<'_>) -> ContextResult<Self> {
        Ok(Self { id: row.get("id")? })
    }
}

#[test]
fn inserted_order_is_visible_after_save() {
    let unit = memory_unit();
    let orders = unit.repository::<Order>().unwrap();

    let mut order = Order::new(42, 1999);
    order.note = Some("gift wrap".to_string());
    orders.insert(&order).unwrap();
    assert_eq!(unit.pending_changes(), 1);
    assert!(orders.all().unwrap().is_empty());

    assert_eq!(unit.save_changes().unwrap(), 1);
    assert_eq!(unit.pending_changes(), 0);

    let stored = orders
        .find(SqlValue::Text(order.id.to_string()))
        .unwrap()
        .expect("order should be stored");
    assert_eq!(stored.customer_id, 42);
    assert_eq!(stored.total_cents, 1999);
    assert_eq!(stored.note.as_deref(), Some("gift wrap"));
    assert_eq!(stored.state, TrackingState::Unchanged);
}

#[test]
fn save_flushes_changes_from_every_repository_atomically() {
    let unit = memory_unit();
    let orders = unit.repository::<Order>().unwrap();
    let customers = unit.repository::<Customer>().unwrap();

    customers
        .insert(&Customer {
            id: 1,
            name: "Ada".to_string(),
        })
        .unwrap();
    orders.insert(&Order::new(1, 100)).unwrap();
    // Violates the CHECK constraint on total_cents.
    orders.insert(&Order::new(1, -5)).unwrap();

    let err = unit.save_changes().unwrap_err();
    assert!(matches!(err, UnitOfWorkError::Context(ContextError::Sqlite(_))));
    assert_eq!(unit.pending_changes(), 3);
    assert_eq!(count_rows(&unit, "customers"), 0);
    assert_eq!(count_rows(&unit, "orders"), 0);
}

#[test]
fn conflicting_update_stays_pending_until_discarded() {
    let unit = memory_unit();
    let customers = unit.repository::<Customer>().unwrap();
    let grace = Customer {
        id: 2,
        name: "Grace".to_string(),
    };

    customers.update(&grace).unwrap();
    assert!(matches!(
        unit.save_changes(),
        Err(UnitOfWorkError::Context(ContextError::ConcurrencyConflict {
            kind: ChangeKind::Update,
            table: "customers",
            ..
        }))
    ));
    assert_eq!(unit.pending_changes(), 1);

    assert_eq!(unit.context().discard_changes(), 1);
    customers.insert(&grace).unwrap();
    assert_eq!(unit.save_changes().unwrap(), 1);
    assert_eq!(customers.all().unwrap(), vec![grace]);
}

#[test]
fn deleting_a_missing_row_is_a_concurrency_conflict() {
    let unit = memory_unit();
    let orders = unit.repository::<Order>().unwrap();
    orders.delete(&Order::new(1, 1)).unwrap();

    let err = unit.save_changes().unwrap_err();
    assert!(matches!(
        err,
        UnitOfWorkError::Context(ContextError::ConcurrencyConflict {
            kind: ChangeKind::Delete,
            table: "orders",
            ..
        })
    ));
}

#[test]
fn apply_changes_follows_tracking_state() {
    let unit = memory_unit();
    let orders = unit.repository::<Order>().unwrap();

    let mut order = Order::new(5, 300);
    assert!(orders.apply_changes(&order).unwrap());
    unit.save_changes().unwrap();

    order.total_cents = 450;
    order.state = TrackingState::Modified;
    assert!(orders.apply_changes(&order).unwrap());
    unit.save_changes().unwrap();
    let stored = orders.all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].total_cents, 450);

    order.state = TrackingState::Unchanged;
    assert!(!orders.apply_changes(&order).unwrap());
    assert_eq!(unit.pending_changes(), 0);

    order.state = TrackingState::Deleted;
    assert!(orders.apply_changes(&order).unwrap());
    assert_eq!(unit.save_changes().unwrap(), 1);
    assert!(orders.all().unwrap().is_empty());
}

#[test]
fn query_filters_with_bound_parameters() {
    let unit = memory_unit();
    let orders = unit.repository::<Order>().unwrap();
    for total in [50, 150, 250] {
        orders.insert(&Order::new(9, total)).unwrap();
    }
    unit.save_changes().unwrap();

    let mut large = orders
        .query(
            "customer_id = @customer AND total_cents > @min",
            Parameters::named([("customer", 9_i64), ("min", 100)]),
        )
        .unwrap();
    large.sort_by_key(|order| order.total_cents);
    let totals: Vec<_> = large.iter().map(|order| order.total_cents).collect();
    assert_eq!(totals, vec![150, 250]);

    assert_eq!(orders.query("  ", Parameters::None).unwrap().len(), 3);
}

#[test]
fn malformed_rows_surface_as_invalid_column() {
    let unit = memory_unit();
    let orders = unit.repository::<Order>().unwrap();
    let missing = orders
        .find(SqlValue::Text("not-a-uuid".to_string()))
        .unwrap();
    assert!(missing.is_none());

    unit.execute_sql_command(
        "INSERT INTO orders (id, customer_id, total_cents) VALUES ('not-a-uuid', 1, 1)",
        Parameters::None,
    )
    .unwrap();
    assert!(matches!(
        orders.all(),
        Err(RepoError::Context(ContextError::InvalidColumn { .. }))
    ));
}

#[test]
fn key_only_entities_cannot_stage_updates() {
    let unit = memory_unit();
    let keys = unit.repository::<CustomerKey>().unwrap();

    assert!(matches!(
        keys.update(&CustomerKey { id: 1 }),
        Err(RepoError::NothingToUpdate("customers"))
    ));
    assert!(matches!(
        keys.apply_changes(&CustomerKey { id: 1 }),
        Err(RepoError::NothingToUpdate("customers"))
    ));
    assert_eq!(unit.pending_changes(), 0);

    keys.delete(&CustomerKey { id: 1 }).unwrap();
    assert_eq!(unit.pending_changes(), 1);
}
