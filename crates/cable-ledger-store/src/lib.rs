//! Storage layer for the cable ledger.
//!
//! This crate provides persistent storage for the catalog (areas, packs,
//! channels, add-ons), connections, and the payment ledger.
//!
//! # Backends
//!
//! - [`MemoryStore`]: everything in one mutex-guarded set of maps. Used by
//!   tests and short-lived tools.
//! - [`RocksStore`] (feature `rocksdb-backend`, on by default): `RocksDB` with
//!   one column family per table plus index families for box numbers, add-ons
//!   by connection, and ledger entries by connection and by date.
//!
//! # Transactions
//!
//! Ledger mutations go through [`Transactional::begin`]. A [`Transaction`]
//! holds the store's write lock until it is committed or dropped, reads see
//! the transaction's own staged writes, and dropping it without calling
//! [`Transaction::commit`] discards every staged write.
//!
//! # Example
//!
//! ```
//! use cable_ledger_core::{Area, BasePack, Connection};
//! use cable_ledger_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let area = Area::new("North Street");
//! let pack = BasePack::new("Basic", 90, 200);
//! store.put_area(&area).unwrap();
//! store.put_pack(&pack).unwrap();
//!
//! let connection = Connection::new("RAVI", "SC-1001", area.id, pack.id, chrono::Utc::now());
//! store.put_connection(&connection).unwrap();
//! assert!(store.find_connection_by_box_number("SC-1001").unwrap().is_some());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;
pub mod snapshot;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;
pub use snapshot::Snapshot;

use cable_ledger_core::{
    Addon, AddonId, Area, AreaId, BasePack, BillingPeriod, Channel, ChannelId, Connection,
    ConnectionId, PackId, Payment, PaymentId,
};

/// A store that can run multi-statement atomic transactions.
pub trait Transactional: Send + Sync {
    /// Start a transaction.
    ///
    /// Blocks until no other transaction or write is in progress. Do not call
    /// other store methods from the same thread while the transaction is open.
    ///
    /// # Errors
    ///
    /// Returns an error if the write lock cannot be taken.
    fn begin(&self) -> Result<Box<dyn Transaction + '_>>;
}

/// An open transaction over the connection and ledger tables.
///
/// Reads observe committed data plus this transaction's staged writes.
/// Nothing is visible to other readers until [`Transaction::commit`]
/// succeeds; dropping the transaction rolls it back.
pub trait Transaction {
    /// Get a connection by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_connection(&self, id: &ConnectionId) -> Result<Option<Connection>>;

    /// Get a base pack by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_pack(&self, id: &PackId) -> Result<Option<BasePack>>;

    /// Get the channel of every add-on row owned by a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_addon_channels(&self, connection_id: &ConnectionId) -> Result<Vec<Channel>>;

    /// Get a ledger entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>>;

    /// Find a ledger entry of the connection dated inside `period`.
    ///
    /// If several match, the newest is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_payment_in_period(
        &self,
        connection_id: &ConnectionId,
        period: &BillingPeriod,
    ) -> Result<Option<Payment>>;

    /// The connection's ledger entry with the greatest date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn latest_payment(&self, connection_id: &ConnectionId) -> Result<Option<Payment>>;

    /// Stage an insert or in-place update of a ledger entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Stage deletion of a ledger entry. Returns whether the entry existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_payment(&mut self, id: &PaymentId) -> Result<bool>;

    /// Stage an update of a connection record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_connection(&mut self, connection: &Connection) -> Result<()>;

    /// Apply every staged write atomically and release the write lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; in that case nothing is applied.
    fn commit(self: Box<Self>) -> Result<()>;
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (`RocksDB`, in-memory for testing).
pub trait Store: Transactional {
    // =========================================================================
    // Area Operations
    // =========================================================================

    /// Insert or update an area.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_area(&self, area: &Area) -> Result<()>;

    /// Get an area by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_area(&self, id: &AreaId) -> Result<Option<Area>>;

    /// List all areas, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_areas(&self) -> Result<Vec<Area>>;

    /// Delete an area.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the area doesn't exist.
    /// - `StoreError::InUse` if a connection belongs to it.
    fn delete_area(&self, id: &AreaId) -> Result<()>;

    // =========================================================================
    // Pack Operations
    // =========================================================================

    /// Insert or update a base pack.
    ///
    /// Existing ledger entries keep the prices they were written with.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_pack(&self, pack: &BasePack) -> Result<()>;

    /// Get a base pack by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_pack(&self, id: &PackId) -> Result<Option<BasePack>>;

    /// List all base packs, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_packs(&self) -> Result<Vec<BasePack>>;

    /// Delete a base pack.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the pack doesn't exist.
    /// - `StoreError::InUse` if a connection is assigned to it.
    fn delete_pack(&self, id: &PackId) -> Result<()>;

    // =========================================================================
    // Channel Operations
    // =========================================================================

    /// Insert or update an add-on channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_channel(&self, channel: &Channel) -> Result<()>;

    /// Get a channel by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_channel(&self, id: &ChannelId) -> Result<Option<Channel>>;

    /// List all channels, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_channels(&self) -> Result<Vec<Channel>>;

    /// Delete a channel.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the channel doesn't exist.
    /// - `StoreError::InUse` if an add-on row references it.
    fn delete_channel(&self, id: &ChannelId) -> Result<()>;

    // =========================================================================
    // Add-on Operations
    // =========================================================================

    /// Insert an add-on row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_addon(&self, addon: &Addon) -> Result<()>;

    /// Delete an add-on row.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the row doesn't exist.
    fn delete_addon(&self, id: &AddonId) -> Result<()>;

    /// List the add-on rows of a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_addons_by_connection(&self, connection_id: &ConnectionId) -> Result<Vec<Addon>>;

    /// Get the channel of every add-on row owned by a connection.
    ///
    /// Rows whose channel no longer exists are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_addon_channels(&self, connection_id: &ConnectionId) -> Result<Vec<Channel>>;

    // =========================================================================
    // Connection Operations
    // =========================================================================

    /// Insert or update a connection.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateBoxNumber` if another connection already
    /// uses the box number.
    fn put_connection(&self, connection: &Connection) -> Result<()>;

    /// Get a connection by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_connection(&self, id: &ConnectionId) -> Result<Option<Connection>>;

    /// Get a connection by its box number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_connection_by_box_number(&self, box_number: &str) -> Result<Option<Connection>>;

    /// List all connections, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_connections(&self) -> Result<Vec<Connection>>;

    // =========================================================================
    // Ledger Reads
    // =========================================================================

    /// Get a ledger entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>>;

    /// List a connection's ledger entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_payments_by_connection(&self, connection_id: &ConnectionId) -> Result<Vec<Payment>>;

    /// List every ledger entry dated inside `period`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_payments_between(&self, period: &BillingPeriod) -> Result<Vec<Payment>>;

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Capture every record in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn export_snapshot(&self) -> Result<Snapshot>;

    /// Replace the whole store with the contents of `snapshot`, atomically.
    ///
    /// # Errors
    ///
    /// Returns a validation error (see [`Snapshot::validate`]) or a database
    /// error; in either case the store is left unchanged.
    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Sort ledger entries newest first; ties broken by ID so the order is stable.
pub(crate) fn sort_newest_first(payments: &mut [Payment]) {
    payments.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
}
