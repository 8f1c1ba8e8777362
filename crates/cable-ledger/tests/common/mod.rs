//! Common test utilities for cable-ledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use cable_ledger::catalog::{self, NewConnection};
use cable_ledger_core::{
    Area, BasePack, BillingPeriod, Channel, Connection, ConnectionId, ManualClock, PackId, Payment,
    PaymentId, Prices,
};
use cable_ledger_store::{
    MemoryStore, Result as StoreResult, RocksStore, Store, StoreError, Transaction, Transactional,
};

/// Noon UTC on the given day.
pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

/// Test harness containing a seeded store and a settable clock.
pub struct TestHarness {
    /// The store under test.
    pub store: Arc<dyn Store>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: Option<TempDir>,
    /// Clock driving billing periods, in UTC.
    pub clock: ManualClock,
    /// The area every test connection belongs to.
    pub area: Area,
    /// A 90 / 200 pack.
    pub basic: BasePack,
    /// A 150 / 320 pack.
    pub premium: BasePack,
    /// A 20 / 50 add-on channel.
    pub sports: Channel,
}

impl TestHarness {
    /// Create a harness over a fresh `RocksDB` database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");
        Self::seed(Arc::new(store), Some(temp_dir))
    }

    /// Create a harness over an in-memory store.
    pub fn in_memory() -> Self {
        Self::seed(Arc::new(MemoryStore::new()), None)
    }

    /// Both backends, for tests that must hold on each.
    pub fn each_backend() -> [Self; 2] {
        [Self::new(), Self::in_memory()]
    }

    fn seed(store: Arc<dyn Store>, temp_dir: Option<TempDir>) -> Self {
        let area = catalog::add_area(store.as_ref(), "North Street").expect("Failed to add area");
        let basic = catalog::add_pack(store.as_ref(), "Basic", Prices::new(90, 200))
            .expect("Failed to add pack");
        let premium = catalog::add_pack(store.as_ref(), "Premium", Prices::new(150, 320))
            .expect("Failed to add pack");
        let sports = catalog::add_channel(store.as_ref(), "Sports", Prices::new(20, 50))
            .expect("Failed to add channel");

        Self {
            store,
            _temp_dir: temp_dir,
            clock: ManualClock::new(at(2025, 1, 1)),
            area,
            basic,
            premium,
            sports,
        }
    }

    /// Register a connection on the basic pack.
    pub fn add_connection(&self, name: &str, box_number: &str) -> Connection {
        catalog::add_connection(
            self.store.as_ref(),
            &self.clock,
            NewConnection {
                name: name.into(),
                box_number: box_number.into(),
                area: self.area.id,
                base_pack: self.basic.id,
                phone_number: None,
            },
        )
        .expect("Failed to add connection")
    }

    /// Reload a connection.
    pub fn connection(&self, id: &ConnectionId) -> Connection {
        self.store
            .get_connection(id)
            .expect("Failed to read connection")
            .expect("Connection missing")
    }

    /// A connection's ledger, newest first.
    pub fn ledger(&self, id: &ConnectionId) -> Vec<Payment> {
        self.store
            .list_payments_by_connection(id)
            .expect("Failed to read ledger")
    }

    /// Every ledger entry in the store.
    pub fn all_entries(&self) -> Vec<Payment> {
        self.store
            .list_payments_between(&BillingPeriod::new(at(2000, 1, 1), at(2100, 1, 1)))
            .expect("Failed to read ledger")
    }

    /// Look up a pack by ID.
    pub fn pack(&self, id: &PackId) -> BasePack {
        self.store
            .get_pack(id)
            .expect("Failed to read pack")
            .expect("Pack missing")
    }

    /// Assert that `last_payment` equals the newest ledger date for every connection.
    pub fn assert_last_payment_consistent(&self) {
        for connection in self.store.list_connections().expect("Failed to list") {
            let newest = self.ledger(&connection.id).first().map(|entry| entry.date);
            assert_eq!(
                connection.last_payment, newest,
                "last_payment out of step for {}",
                connection.box_number
            );
        }
    }
}

/// A store whose transactions stage writes normally but fail to commit.
pub struct FailingCommit<'a> {
    pub inner: &'a dyn Store,
}

impl Transactional for FailingCommit<'_> {
    fn begin(&self) -> StoreResult<Box<dyn Transaction + '_>> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin()?,
        }))
    }
}

struct FailingTransaction<'a> {
    inner: Box<dyn Transaction + 'a>,
}

impl Transaction for FailingTransaction<'_> {
    fn get_connection(&self, id: &ConnectionId) -> StoreResult<Option<Connection>> {
        self.inner.get_connection(id)
    }

    fn get_pack(&self, id: &PackId) -> StoreResult<Option<BasePack>> {
        self.inner.get_pack(id)
    }

    fn list_addon_channels(&self, connection_id: &ConnectionId) -> StoreResult<Vec<Channel>> {
        self.inner.list_addon_channels(connection_id)
    }

    fn get_payment(&self, id: &PaymentId) -> StoreResult<Option<Payment>> {
        self.inner.get_payment(id)
    }

    fn find_payment_in_period(
        &self,
        connection_id: &ConnectionId,
        period: &BillingPeriod,
    ) -> StoreResult<Option<Payment>> {
        self.inner.find_payment_in_period(connection_id, period)
    }

    fn latest_payment(&self, connection_id: &ConnectionId) -> StoreResult<Option<Payment>> {
        self.inner.latest_payment(connection_id)
    }

    fn put_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        self.inner.put_payment(payment)
    }

    fn delete_payment(&mut self, id: &PaymentId) -> StoreResult<bool> {
        self.inner.delete_payment(id)
    }

    fn put_connection(&mut self, connection: &Connection) -> StoreResult<()> {
        self.inner.put_connection(connection)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        // Dropping the inner transaction discards everything it staged.
        drop(self.inner);
        Err(StoreError::Database("disk full".into()))
    }
}
