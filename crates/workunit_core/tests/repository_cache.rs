mod common;

use common::{memory_context, memory_unit, Customer, Order};
use std::cell::RefCell;
use std::rc::Rc;
use workunit_core::{
    ConstructionFailure, ContextResult, DataRow, Entity, EntityRepository, LocatorMode,
    Parameters, RepoError, RepoResult, Repository, RepositoryLocator, SqlValue, Trackable,
    TrackingState, UnitOfWork, UnitOfWorkError,
};

#[derive(Debug, Clone)]
struct Invoice;

impl Trackable for Invoice {
    fn tracking_state(&self) -> TrackingState {
        TrackingState::Unchanged
    }
    fn set_tracking_state(&mut self, _state: TrackingState) {}
}

impl Entity for Invoice {
    const TABLE: &'static str = "invoices";
    const KEY_COLUMN: &'static str = "id";
    fn columns() -> &'static [&'static str] {
        &["id"]
    }
    fn key(&self) -> SqlValue {
        SqlValue::Null
    }
    fn values(&self) -> Vec<SqlValue> {
        vec![SqlValue::Null]
    }
    fn from_row(_row: &DataRow<'_>) -> ContextResult<Self> {
        Ok(Invoice)
    }
}

#[derive(Debug, Clone)]
struct CustomerWithEmail;

impl Trackable for CustomerWithEmail {
    fn tracking_state(&self) -> TrackingState {
        TrackingState::Unchanged
    }
    fn set_tracking_state(&mut self, _state: TrackingState) {}
}

impl Entity for CustomerWithEmail {
    const TABLE: &'static str = "customers";
    const KEY_COLUMN: &'static str = "id";
    fn columns() -> &'static [&'static str] {
        &["id", "name", "email"]
    }
    fn key(&self) -> SqlValue {
        SqlValue::Null
    }
    fn values(&self) -> Vec<SqlValue> {
        vec![SqlValue::Null; 3]
    }
    fn from_row(_row: &DataRow<'_>) -> ContextResult<Self> {
        Ok(CustomerWithEmail)
    }
}

#[derive(Default)]
struct RecordingOrders {
    inserted: RefCell<Vec<i64>>,
}

impl EntityRepository<Order> for RecordingOrders {
    fn find(&self, _key: SqlValue) -> RepoResult<Option<Order>> {
        Ok(None)
    }
    fn all(&self) -> RepoResult<Vec<Order>> {
        Ok(Vec::new())
    }
    fn query(&self, _filter: &str, _parameters: Parameters) -> RepoResult<Vec<Order>> {
        Ok(Vec::new())
    }
    fn insert(&self, entity: &Order) -> RepoResult<()> {
        self.inserted.borrow_mut().push(entity.total_cents);
        Ok(())
    }
    fn update(&self, _entity: &Order) -> RepoResult<()> {
        Ok(())
    }
    fn delete(&self, _entity: &Order) -> RepoResult<()> {
        Ok(())
    }
}

#[test]
fn same_type_returns_the_same_instance() {
    let unit = memory_unit();
    let first = unit.repository::<Order>().unwrap();
    let second = unit.repository::<Order>().unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(unit.repository_count(), 1);
}

#[test]
fn distinct_types_get_distinct_instances() {
    let unit = memory_unit();
    let orders = unit.repository::<Order>().unwrap();
    let customers = unit.repository::<Customer>().unwrap();

    assert_ne!(
        Rc::as_ptr(&orders) as *const (),
        Rc::as_ptr(&customers) as *const ()
    );
    assert_eq!(unit.repository_count(), 2);

    customers
        .insert(&Customer {
            id: 1,
            name: "Ada".to_string(),
        })
        .unwrap();
    unit.save_changes().unwrap();
    assert!(orders.all().unwrap().is_empty());
    assert_eq!(customers.all().unwrap().len(), 1);
}

#[test]
fn separate_units_never_share_repositories() {
    let first = memory_unit();
    let second = memory_unit();
    let a = first.repository::<Order>().unwrap();
    let b = second.repository::<Order>().unwrap();
    assert!(!Rc::ptr_eq(&a, &b));
}

#[test]
fn missing_table_is_a_construction_failure() {
    let unit = memory_unit();
    let err = unit.repository::<Invoice>().err().expect("invoices table is absent");

    match err {
        UnitOfWorkError::Construction {
            entity,
            reason: ConstructionFailure::Schema(RepoError::MissingRequiredTable(table)),
        } => {
            assert!(entity.ends_with("Invoice"));
            assert_eq!(table, "invoices");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(unit.repository_count(), 0);
}

#[test]
fn missing_column_is_a_construction_failure() {
    let unit = memory_unit();
    let err = unit
        .repository::<CustomerWithEmail>()
        .err()
        .expect("email column is absent");

    assert!(matches!(
        err,
        UnitOfWorkError::Construction {
            reason: ConstructionFailure::Schema(RepoError::MissingRequiredColumn {
                table: "customers",
                column: "email",
            }),
            ..
        }
    ));
}

#[test]
fn locator_registration_overrides_the_default_repository() {
    let recording = Rc::new(RecordingOrders::default());
    let mut locator = RepositoryLocator::default();
    let handle: Rc<dyn EntityRepository<Order>> = recording.clone();
    locator.register_instance::<Order>(handle).unwrap();

    let unit = UnitOfWork::with_locator(memory_context(), locator);
    let orders = unit.repository::<Order>().unwrap();
    orders.insert(&Order::new(1, 250)).unwrap();

    assert_eq!(*recording.inserted.borrow(), vec![250]);
    assert_eq!(unit.pending_changes(), 0);
    assert_eq!(unit.repository_count(), 0);

    // Unregistered types still fall back to the built-in repository.
    unit.repository::<Customer>().unwrap();
    assert_eq!(unit.repository_count(), 1);
}

#[test]
fn required_locator_rejects_unregistered_types() {
    let unit = UnitOfWork::with_locator(
        memory_context(),
        RepositoryLocator::new(LocatorMode::Required),
    );
    let err = unit.repository::<Customer>().err().expect("no registration");

    assert!(matches!(
        err,
        UnitOfWorkError::Construction {
            reason: ConstructionFailure::MissingRegistration,
            ..
        }
    ));
}

#[test]
fn repositories_resolve_siblings_through_their_unit() {
    let unit = memory_unit();
    let orders =
        Repository::<Order, _>::try_new(Rc::clone(unit.context()), unit.downgrade()).unwrap();

    let via_orders = orders.related::<Customer>().unwrap();
    let direct = unit.repository::<Customer>().unwrap();
    assert!(Rc::ptr_eq(&via_orders, &direct));

    drop(via_orders);
    drop(direct);
    drop(unit);
    assert!(matches!(
        orders.related::<Customer>(),
        Err(RepoError::Detached(_))
    ));
}
