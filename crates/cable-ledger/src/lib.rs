//! Billing ledger operations for a cable TV operator.
//!
//! Every operation takes an explicit store handle and, where the current time
//! matters, a [`Clock`]. Mutations of the ledger run inside one store
//! transaction so the connection's `last_payment` cache and its ledger
//! entries always move together.
//!
//! # Operations
//!
//! - [`compose_price`]: base pack plus add-on channel prices.
//! - [`mark_connection_as_paid`]: record at most one payment per billing period.
//! - [`migrate_pack`]: switch a connection's pack, superseding this period's entry.
//! - [`delete_payment`]: remove a ledger entry and repair `last_payment`.
//! - [`repair`]: re-derive `last_payment` after bulk changes.
//! - [`catalog`], [`import`], [`export`], [`stats`]: the surrounding bookkeeping.
//!
//! # Example
//!
//! ```
//! use cable_ledger::{mark_connection_as_paid, PaymentOutcome};
//! use cable_ledger_core::{Area, BasePack, Connection, ManualClock};
//! use cable_ledger_store::{MemoryStore, Store};
//!
//! let clock = ManualClock::new(chrono::Utc::now());
//! let store = MemoryStore::new();
//! let area = Area::new("North Street");
//! let pack = BasePack::new("Basic", 90, 200);
//! store.put_area(&area).unwrap();
//! store.put_pack(&pack).unwrap();
//! let connection = Connection::new("RAVI", "SC-1001", area.id, pack.id, chrono::Utc::now());
//! store.put_connection(&connection).unwrap();
//!
//! let first = mark_connection_as_paid(&store, &clock, &connection.id, &pack).unwrap();
//! assert!(matches!(first, PaymentOutcome::Recorded(_)));
//! let second = mark_connection_as_paid(&store, &clock, &connection.id, &pack).unwrap();
//! assert!(matches!(second, PaymentOutcome::AlreadyPaid(_)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod config;
pub mod export;
pub mod import;
pub mod migration;
pub mod payments;
pub mod pricing;
pub mod repair;
pub mod stats;
pub mod telemetry;

pub use cable_ledger_core::{Clock, LedgerError, Result};
pub use config::LedgerConfig;
pub use migration::migrate_pack;
pub use payments::{delete_payment, mark_connection_as_paid, PaymentOutcome};
pub use pricing::compose_price;

use cable_ledger_core::ConnectionId;
use cable_ledger_store::Transaction;

/// Commit a ledger transaction, logging the failure if nothing was applied.
pub(crate) fn commit(tx: Box<dyn Transaction + '_>, operation: &'static str) -> Result<()> {
    tx.commit().map_err(|e| {
        tracing::error!(operation, error = %e, "Ledger write failed; nothing was applied");
        LedgerError::from(e)
    })
}

pub(crate) fn connection_not_found(connection_id: &ConnectionId) -> LedgerError {
    LedgerError::ConnectionNotFound {
        connection_id: connection_id.to_string(),
    }
}
